use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::ops::ControlFlow;
use tokio::sync::mpsc;

use super::{ create_streaming_response, require_api_key, Completion, CompletionProvider, CompletionRequest, FragmentStream, ProviderConfig };
use crate::error::{ RelayError, Result };
use crate::models::{ ChatMessage, FramePayload, Usage };
use crate::sse::{ data_payload, LineDecoder };

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible client for the OpenRouter aggregation API.
pub struct OpenRouterClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct OpenRouterChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

impl OpenRouterChatRequest {
    fn from_request(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.parameters.model.clone(),
            messages: request.messages.clone(),
            temperature: request.parameters.temperature,
            max_tokens: request.parameters.max_tokens,
            stream: if stream { Some(true) } else { None },
        }
    }
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    model: Option<String>,
    choices: Vec<OpenRouterChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenRouterErrorBody {
    error: OpenRouterErrorDetail,
}

#[derive(Deserialize)]
struct OpenRouterErrorDetail {
    message: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        site_url: Option<&str>,
        site_name: Option<&str>
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                RelayError::Config(format!("Invalid API key format: {}", e))
            )?
        );
        if let Some(url) = site_url {
            headers.insert(
                "HTTP-Referer",
                HeaderValue::from_str(url).map_err(|e|
                    RelayError::Config(format!("Invalid site URL header: {}", e))
                )?
            );
        }
        if let Some(name) = site_name {
            headers.insert(
                "X-Title",
                HeaderValue::from_str(name).map_err(|e|
                    RelayError::Config(format!("Invalid site name header: {}", e))
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = require_api_key(config)?;
        Self::new(
            &api_key,
            Some(config.base_url.clone()),
            config.site_url.as_deref(),
            config.site_name.as_deref()
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &OpenRouterChatRequest) -> Result<Response> {
        let resp = self.http
            .post(self.completions_url())
            .json(body)
            .send().await
            .map_err(|e| RelayError::upstream(None, format!("provider unreachable: {}", e)))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(upstream_error(resp).await)
        }
    }
}

async fn upstream_error(resp: Response) -> RelayError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<OpenRouterErrorBody>(&body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            }
        });
    RelayError::upstream(Some(status.as_u16()), message)
}

/// Forwards one provider event-stream line. `Break` ends the read: the
/// provider finished, failed, or the receiver is gone.
async fn forward_line(line: &str, tx: &mpsc::Sender<Result<String>>) -> ControlFlow<()> {
    let Some(data) = data_payload(line) else {
        return ControlFlow::Continue(());
    };
    match FramePayload::parse(data) {
        Ok(FramePayload::Done) => ControlFlow::Break(()),
        Ok(FramePayload::Fragment(text)) => {
            if tx.send(Ok(text)).await.is_err() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Ok(FramePayload::Failure(message)) => {
            let _ = tx.send(Err(RelayError::upstream(None, message))).await;
            ControlFlow::Break(())
        }
        Ok(FramePayload::Empty) => ControlFlow::Continue(()),
        Err(e) => {
            warn!("Skipping malformed provider chunk: {} for data: {}", e, data);
            ControlFlow::Continue(())
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = OpenRouterChatRequest::from_request(request, false);
        let resp = self.send(&body).await?;
        let parsed = resp
            .json::<OpenRouterResponse>().await
            .map_err(|e| RelayError::upstream(None, format!("unreadable provider response: {}", e)))?;

        let content = parsed.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(Completion {
            content,
            usage: parsed.usage,
            model: parsed.model,
        })
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let body = OpenRouterChatRequest::from_request(request, true);
        let resp = self.send(&body).await?;
        info!("Provider stream opened for model {}", body.model);

        Ok(
            create_streaming_response(move |tx| async move {
                let mut bytes = resp.bytes_stream();
                let mut decoder = LineDecoder::new();

                while let Some(chunk) = bytes.next().await {
                    let chunk = match chunk {
                        Ok(c) => c,
                        Err(e) => {
                            let _ = tx.send(
                                Err(RelayError::upstream(None, format!("provider stream broke: {}", e)))
                            ).await;
                            return;
                        }
                    };
                    debug!("Provider raw chunk: {} bytes", chunk.len());

                    for line in decoder.push(&chunk) {
                        if forward_line(&line, &tx).await.is_break() {
                            return;
                        }
                    }
                }
                if let Some(line) = decoder.finish() {
                    let _ = forward_line(&line, &tx).await;
                }
            })
        )
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}
