//! Client side of the relay: sends a conversation and reassembles the
//! streamed answer.
//!
//! [`TranscriptClient::stream_chat`] returns a [`ChatStream`] of ordered
//! [`StreamEvent`]s; [`TranscriptClient::stream_chat_with`] drives the same
//! stream into a [`TranscriptHandler`]. Either way a call ends with exactly one
//! terminal event.

pub mod transcript;

use futures::{ Stream, StreamExt };
use log::{ debug, error, warn };
use reqwest::{ Client as HttpClient, RequestBuilder, StatusCode };
use std::pin::Pin;
use std::task::{ Context, Poll };
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ RelayError, Result };
use crate::models::{ ChatOptions, ChatResponse, ErrorBody, FramePayload };
use crate::sse::{ data_payload, LineDecoder };

pub use transcript::{ Transcript, TranscriptHandler, TranscriptState };

pub const CHAT_ROUTE: &str = "/api/chat";
pub const STREAM_ROUTE: &str = "/api/chat/stream";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Complete,
    Failed(RelayError),
}

/// Events of one streaming call, in arrival order.
///
/// Dropping the stream aborts the background read and closes the connection.
pub struct ChatStream {
    rx: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl ChatStream {
    /// Drains the stream into the full assistant text.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Chunk(chunk) => text.push_str(&chunk),
                StreamEvent::Complete => {
                    return Ok(text);
                }
                StreamEvent::Failed(e) => {
                    return Err(e);
                }
            }
        }
        Err(RelayError::TransportFailure("stream ended without a terminal event".into()))
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct TranscriptClient {
    http: HttpClient,
    base_url: String,
}

impl TranscriptClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http(http, base_url))
    }

    pub fn with_http(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), route)
    }

    /// Non-streaming call. Failures are folded into `success: false`.
    pub async fn send_chat(&self, options: &ChatOptions) -> ChatResponse {
        match self.try_send_chat(options).await {
            Ok(response) => response,
            Err(e) => {
                error!("send_chat failed: {}", e);
                ChatResponse::failed(e.description())
            }
        }
    }

    async fn try_send_chat(&self, options: &ChatOptions) -> Result<ChatResponse> {
        let resp = self.http
            .post(self.url(CHAT_ROUTE))
            .json(options)
            .send().await
            .map_err(|e| RelayError::TransportFailure(format!("could not reach relay: {}", e)))?;
        let status = resp.status();
        let body = resp
            .bytes().await
            .map_err(|e| RelayError::TransportFailure(format!("response read failed: {}", e)))?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_slice::<ChatResponse>(&body)
            .map_err(|e| RelayError::upstream(Some(status.as_u16()), format!("unreadable response: {}", e)))
    }

    /// Opens a streaming call on its own task. Must be called from within a
    /// tokio runtime.
    pub fn stream_chat(&self, options: &ChatOptions) -> ChatStream {
        let (tx, rx) = mpsc::channel(32);
        let request = self.http.post(self.url(STREAM_ROUTE)).json(options);

        let task = tokio::spawn(async move {
            let terminal = match read_event_stream(request, &tx).await {
                Ok(()) => StreamEvent::Complete,
                Err(RelayError::Cancelled) => {
                    return;
                }
                Err(e) => StreamEvent::Failed(e),
            };
            let _ = tx.send(terminal).await;
        });

        ChatStream { rx, task }
    }

    /// Drives a streaming call into `handler` and returns the terminal state.
    pub async fn stream_chat_with<H: TranscriptHandler>(
        &self,
        options: &ChatOptions,
        handler: &mut H
    ) -> TranscriptState {
        handler.on_start();
        let mut stream = self.stream_chat(options);

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Chunk(text) => handler.on_chunk(&text),
                StreamEvent::Complete => {
                    handler.on_complete();
                    return TranscriptState::Completed;
                }
                StreamEvent::Failed(e) => {
                    error!("stream_chat failed: {}", e);
                    handler.on_error(&e);
                    return TranscriptState::Failed;
                }
            }
        }

        let e = RelayError::TransportFailure("stream ended without a terminal event".into());
        handler.on_error(&e);
        TranscriptState::Failed
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> RelayError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error, details: Some(details) }) => format!("{}: {}", error, details),
        Ok(ErrorBody { error, details: None }) => error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    if status == StatusCode::BAD_REQUEST {
        RelayError::InvalidInput(message)
    } else {
        RelayError::upstream(Some(status.as_u16()), message)
    }
}

async fn read_event_stream(request: RequestBuilder, tx: &mpsc::Sender<StreamEvent>) -> Result<()> {
    let resp = request
        .send().await
        .map_err(|e| RelayError::TransportFailure(format!("could not reach relay: {}", e)))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    let mut body = resp.bytes_stream();
    let mut decoder = LineDecoder::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e|
            RelayError::TransportFailure(format!("stream read failed: {}", e))
        )?;
        debug!("Relay chunk: {} bytes", chunk.len());
        for line in decoder.push(&chunk) {
            dispatch_line(&line, tx).await?;
        }
    }
    if let Some(line) = decoder.finish() {
        dispatch_line(&line, tx).await?;
    }
    Ok(())
}

async fn dispatch_line(line: &str, tx: &mpsc::Sender<StreamEvent>) -> Result<()> {
    let Some(data) = data_payload(line) else {
        return Ok(());
    };

    match FramePayload::parse(data) {
        Ok(FramePayload::Fragment(text)) =>
            tx.send(StreamEvent::Chunk(text)).await.map_err(|_| RelayError::Cancelled),
        Ok(FramePayload::Failure(message)) => Err(RelayError::upstream(None, message)),
        Ok(FramePayload::Done) | Ok(FramePayload::Empty) => Ok(()),
        Err(e) => {
            warn!("Skipping {} for data: {}", RelayError::MalformedFragment(e.to_string()), data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use crate::sse::frame;
    use wiremock::matchers::{ body_partial_json, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn hi() -> ChatOptions {
        ChatOptions::new(vec![ChatMessage::user("hi")])
    }

    async fn relay_with_body(body: impl Into<Vec<u8>>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_ROUTE))
            .and(body_partial_json(serde_json::json!({
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.into(), "text/event-stream"))
            .mount(&server).await;
        server
    }

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        completes: usize,
        errors: Vec<RelayError>,
    }

    impl TranscriptHandler for Recorder {
        fn on_chunk(&mut self, text: &str) {
            self.chunks.push(text.to_string());
        }

        fn on_complete(&mut self) {
            self.completes += 1;
        }

        fn on_error(&mut self, error: &RelayError) {
            self.errors.push(error.clone());
        }
    }

    #[tokio::test]
    async fn assembles_fragments_in_order() {
        let body = [
            frame(r#"{"content":"Hel"}"#),
            frame(r#"{"content":"lo!"}"#),
            frame("[DONE]"),
        ].concat();
        let server = relay_with_body(body).await;
        let client = TranscriptClient::new(server.uri()).unwrap();

        let mut transcript = Transcript::new();
        let state = client.stream_chat_with(&hi(), &mut transcript).await;
        assert_eq!(state, TranscriptState::Completed);
        assert_eq!(transcript.state(), TranscriptState::Completed);
        assert_eq!(transcript.text(), "Hello!");
        assert!(transcript.error().is_none());
    }

    #[tokio::test]
    async fn malformed_fragment_is_skipped() {
        let body = [
            frame(r#"{"content":"a"}"#),
            frame(r#"{"content":"#),
            ": comment\n\n".to_string(),
            frame(r#"{"choices":[{"delta":{"content":"b"}}]}"#),
            frame("[DONE]"),
        ].concat();
        let server = relay_with_body(body).await;
        let client = TranscriptClient::new(server.uri()).unwrap();

        let mut recorder = Recorder::default();
        client.stream_chat_with(&hi(), &mut recorder).await;
        assert_eq!(recorder.chunks, vec!["a", "b"]);
        assert_eq!(recorder.completes, 1);
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn error_frame_fails_the_call_once() {
        let body = [frame(r#"{"content":"part"}"#), frame(r#"{"error":"Rate limit exceeded"}"#)].concat();
        let server = relay_with_body(body).await;
        let client = TranscriptClient::new(server.uri()).unwrap();

        let mut recorder = Recorder::default();
        let state = client.stream_chat_with(&hi(), &mut recorder).await;
        assert_eq!(state, TranscriptState::Failed);
        assert_eq!(recorder.chunks, vec!["part"]);
        assert_eq!(recorder.completes, 0);
        assert_eq!(recorder.errors, vec![RelayError::upstream(None, "Rate limit exceeded")]);
    }

    #[tokio::test]
    async fn non_success_status_invokes_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_ROUTE))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "bad messages" }))
            )
            .mount(&server).await;
        let client = TranscriptClient::new(server.uri()).unwrap();

        let mut recorder = Recorder::default();
        client.stream_chat_with(&hi(), &mut recorder).await;
        assert!(recorder.chunks.is_empty());
        assert_eq!(recorder.completes, 0);
        assert_eq!(recorder.errors, vec![RelayError::InvalidInput("bad messages".into())]);
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_transport_failure() {
        let client = TranscriptClient::new("http://127.0.0.1:9").unwrap();
        let mut recorder = Recorder::default();
        client.stream_chat_with(&hi(), &mut recorder).await;
        assert_eq!(recorder.completes, 0);
        assert_eq!(recorder.errors.len(), 1);
        assert!(matches!(recorder.errors[0], RelayError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn stream_without_done_still_completes() {
        let server = relay_with_body(frame(r#"{"content":"tail"}"#)).await;
        let client = TranscriptClient::new(server.uri()).unwrap();
        let text = client.stream_chat(&hi()).collect_text().await.unwrap();
        assert_eq!(text, "tail");
    }

    #[tokio::test]
    async fn send_chat_folds_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_ROUTE))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "success": true,
                    "message": "Hello!",
                    "model": "openai/gpt-4o-mini"
                }))
            )
            .mount(&server).await;
        let client = TranscriptClient::new(server.uri()).unwrap();
        let response = client.send_chat(&hi()).await;
        assert!(response.success);
        assert_eq!(response.message, "Hello!");

        let client = TranscriptClient::new("http://127.0.0.1:9").unwrap();
        let response = client.send_chat(&hi()).await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }
}
