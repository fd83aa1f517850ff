use crate::error::RelayError;
use crate::llm::{ CompletionProvider, CompletionRequest };
use crate::models::{ ChatOptions, ChatResponse, ErrorBody, FramePayload, GenerationParameters, DONE_MARKER };
use std::convert::Infallible;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    body::Bytes,
    extract::State,
    response::{ IntoResponse, Response, sse::{ Event, Sse } },
    http::StatusCode,
};
use futures::{ Stream, StreamExt };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;
use log::{ info, warn, error };

pub const MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
    pub defaults: GenerationParameters,
}

impl AppState {
    pub fn new(provider: Arc<dyn CompletionProvider>, defaults: GenerationParameters) -> Self {
        Self { provider, defaults }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)).layer(cors))
        .with_state(state)
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            RelayError::InvalidInput(message) =>
                (StatusCode::BAD_REQUEST, ErrorBody { error: message, details: None }),
            RelayError::UpstreamFailure { status: Some(code), message } => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
                (status, ErrorBody {
                    error: "Error communicating with the provider".into(),
                    details: Some(message),
                })
            }
            other =>
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody {
                    error: "Internal server error".into(),
                    details: Some(other.description()),
                }),
        };
        (status, Json(body)).into_response()
    }
}

fn completion_request(options: ChatOptions, defaults: &GenerationParameters) -> CompletionRequest {
    let parameters = options.parameters(defaults);
    CompletionRequest { messages: options.messages, parameters }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, RelayError> {
    let request_id = Uuid::new_v4();
    let options = ChatOptions::from_json(&body).map_err(|e| {
        warn!("[{}] rejected /api/chat request: {}", request_id, e);
        e
    })?;
    let request = completion_request(options, &state.defaults);
    info!(
        "[{}] /api/chat model={} messages={}",
        request_id,
        request.parameters.model,
        request.messages.len()
    );

    let completion = state.provider.complete(&request).await.map_err(|e| {
        error!("[{}] provider call failed: {}", request_id, e);
        e
    })?;

    Ok(Json(ChatResponse {
        success: true,
        message: completion.content,
        usage: completion.usage,
        model: completion.model.or(Some(request.parameters.model)),
        ..Default::default()
    }))
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let request_id = Uuid::new_v4();
    let options = ChatOptions::from_json(&body).map_err(|e| {
        warn!("[{}] rejected /api/chat/stream request: {}", request_id, e);
        e
    })?;
    let request = completion_request(options, &state.defaults);
    info!(
        "[{}] /api/chat/stream model={} messages={}",
        request_id,
        request.parameters.model,
        request.messages.len()
    );

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(relay_fragments(state.provider.clone(), request, tx, request_id));

    Ok(Sse::new(ReceiverStream::new(rx).map(Ok::<_, Infallible>)))
}

/// Pumps provider fragments into SSE events. Ends with `[DONE]` on success or
/// with a single error frame on failure, never both.
async fn relay_fragments(
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
    tx: mpsc::Sender<Event>,
    request_id: Uuid
) {
    let mut fragments = match provider.complete_stream(&request).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("[{}] provider stream failed to open: {}", request_id, e);
            let _ = tx.send(error_event(&e)).await;
            return;
        }
    };

    let mut sent = 0usize;
    loop {
        // a stalled provider must not outlive the client
        let item = tokio::select! {
            item = fragments.next() => item,
            _ = tx.closed() => {
                info!("[{}] client went away after {} fragments", request_id, sent);
                return;
            }
        };
        let Some(item) = item else {
            break;
        };
        match item {
            Ok(text) if text.is_empty() => {}
            Ok(text) => {
                if tx.send(Event::default().data(FramePayload::fragment_json(&text))).await.is_err() {
                    info!("[{}] client went away after {} fragments", request_id, sent);
                    return;
                }
                sent += 1;
            }
            Err(e) => {
                error!("[{}] provider stream failed after {} fragments: {}", request_id, sent, e);
                let _ = tx.send(error_event(&e)).await;
                return;
            }
        }
    }

    let _ = tx.send(Event::default().data(DONE_MARKER)).await;
    info!("[{}] stream complete, {} fragments relayed", request_id, sent);
}

fn error_event(error: &RelayError) -> Event {
    Event::default().data(FramePayload::error_json(&error.description()))
}
