pub mod openrouter;

use async_trait::async_trait;
use futures::{ Future, Stream };
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ RelayError, Result };
use crate::models::{ ChatMessage, GenerationParameters, Usage };

pub use self::openrouter::OpenRouterClient;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub parameters: GenerationParameters,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
    pub model: Option<String>,
}

/// A remote completion service. The relay only ever talks to one of these.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Opens an incremental-output request. Fragments arrive in emission order;
    /// the stream ends after the provider signals completion or after the
    /// first `Err` item.
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: openrouter::DEFAULT_BASE_URL.to_string(),
            site_url: None,
            site_name: None,
        }
    }
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<Result<String>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &ProviderConfig) -> Result<std::sync::Arc<dyn CompletionProvider>> {
    let client = OpenRouterClient::from_config(config)?;
    Ok(std::sync::Arc::new(client))
}

pub(crate) fn require_api_key(config: &ProviderConfig) -> Result<String> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(RelayError::Config("OPENROUTER_API_KEY is not set".into())),
    }
}
