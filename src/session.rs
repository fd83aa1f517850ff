use std::io::Write;
use log::{ info, warn };
use tokio::io::{ AsyncBufRead, AsyncBufReadExt };

use crate::client::{ TranscriptClient, TranscriptHandler, TranscriptState };
use crate::error::{ RelayError, Result };
use crate::models::{ ChatMessage, ChatOptions, Conversation };

/// Generation settings a session sends with every turn. `None` leaves the
/// choice to the relay's defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub system_prompt: Option<String>,
}

/// One chat session: the in-memory conversation plus the client used to
/// extend it.
pub struct ChatSession {
    client: TranscriptClient,
    conversation: Conversation,
    options: SessionOptions,
}

/// Echoes fragments to `out` while they arrive and keeps the partial text.
struct EchoHandler<'a, W: Write> {
    out: &'a mut W,
    partial: String,
    error: Option<RelayError>,
}

impl<W: Write> TranscriptHandler for EchoHandler<'_, W> {
    fn on_chunk(&mut self, text: &str) {
        self.partial.push_str(text);
        if let Err(e) = write!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            warn!("Failed to echo fragment: {}", e);
        }
    }

    fn on_complete(&mut self) {
        let _ = writeln!(self.out);
    }

    fn on_error(&mut self, error: &RelayError) {
        self.error = Some(error.clone());
    }
}

impl ChatSession {
    pub fn new(client: TranscriptClient, options: SessionOptions) -> Self {
        let conversation = match &options.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => Conversation::with_system_prompt(prompt.clone()),
            _ => Conversation::new(),
        };
        Self { client, conversation, options }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            messages: self.conversation.messages().to_vec(),
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        }
    }

    /// Sends one user turn, echoing the answer to `out` as it streams.
    ///
    /// The assistant message joins the conversation only once the stream has
    /// completed. On failure the user message stays and nothing else is added.
    pub async fn send<W: Write>(&mut self, text: &str, out: &mut W) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RelayError::InvalidInput("message is empty".into()));
        }
        self.conversation.push(ChatMessage::user(text));

        let options = self.chat_options();
        let mut handler = EchoHandler { out, partial: String::new(), error: None };
        let state = self.client.stream_chat_with(&options, &mut handler).await;

        match state {
            TranscriptState::Completed => {
                let answer = handler.partial;
                self.conversation.push(ChatMessage::assistant(answer.clone()));
                Ok(answer)
            }
            _ => {
                Err(
                    handler.error.unwrap_or_else(||
                        RelayError::TransportFailure("stream did not complete".into())
                    )
                )
            }
        }
    }

    /// Line-oriented loop: every non-empty input line is one user turn.
    /// `/exit` or end of input stops the loop.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
        where R: AsyncBufRead + Unpin, W: Write
    {
        let mut lines = input.lines();
        info!("Chat session against {}", self.client.base_url());

        loop {
            let _ = write!(out, "> ").and_then(|_| out.flush());
            let line = lines
                .next_line().await
                .map_err(|e| RelayError::TransportFailure(format!("failed to read input: {}", e)))?;
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/exit" {
                break;
            }

            if let Err(e) = self.send(line, out).await {
                let _ = writeln!(out, "\n[error] {}", e.description());
            }
        }

        info!("Chat session ended after {} messages", self.conversation.len());
        Ok(())
    }
}
