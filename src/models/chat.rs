use serde::{ Serialize, Deserialize };
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ RelayError, Result };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RelayError::InvalidInput(format!("unrecognized role '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only list of messages for one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.push(ChatMessage::system(prompt));
        conversation
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Fully resolved generation settings sent to the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            model: super::catalog::GPT_4O_MINI.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Request body accepted by both relay endpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
}

#[derive(Deserialize)]
struct RawChatOptions {
    messages: Option<Value>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
}

impl ChatOptions {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Default::default() }
    }

    /// Parses and validates a request body.
    ///
    /// Role and content are checked by hand rather than through serde so every
    /// shape problem comes back as `InvalidInput` with a readable message.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawChatOptions = serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidInput(format!("malformed request body: {}", e)))?;

        let entries = match raw.messages {
            Some(Value::Array(entries)) if !entries.is_empty() => entries,
            _ => {
                return Err(
                    RelayError::InvalidInput(
                        "field \"messages\" is required and must be a non-empty array".into()
                    )
                );
            }
        };

        let messages = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| parse_message(entry).map_err(|e| match e {
                RelayError::InvalidInput(msg) => RelayError::InvalidInput(
                    format!("messages[{}]: {}", i, msg)
                ),
                other => other,
            }))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            messages,
            model: raw.model,
            temperature: raw.temperature,
            max_tokens: raw.max_tokens,
        })
    }

    /// Fills unset parameters from `defaults`.
    pub fn parameters(&self, defaults: &GenerationParameters) -> GenerationParameters {
        GenerationParameters {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

fn parse_message(entry: &Value) -> Result<ChatMessage> {
    let role = entry
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::InvalidInput("missing \"role\"".into()))?
        .parse::<Role>()?;

    let content = match entry.get("content").and_then(Value::as_str) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => {
            return Err(RelayError::InvalidInput("\"content\" must be a non-empty string".into()));
        }
    };

    Ok(ChatMessage { role, content })
}
