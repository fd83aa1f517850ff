use serde::{ Serialize, Deserialize };

/// Literal payload of the terminal frame.
pub const DONE_MARKER: &str = "[DONE]";

/// One incremental unit of assistant output, as framed by the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamFragment {
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct FrameError {
    error: String,
}

#[derive(Deserialize)]
struct DeltaChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// What a single `data:` payload carries once parsed.
///
/// Accepts both the relay's own frames and raw OpenAI-style chunks
/// (`choices[0].delta.content`), so a client can be pointed at either.
#[derive(Debug, PartialEq)]
pub enum FramePayload {
    Done,
    Fragment(String),
    Failure(String),
    Empty,
}

#[derive(Deserialize)]
struct RawPayload {
    content: Option<String>,
    error: Option<serde_json::Value>,
    choices: Option<Vec<DeltaChoice>>,
}

impl FramePayload {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        if data.trim() == DONE_MARKER {
            return Ok(FramePayload::Done);
        }

        let raw: RawPayload = serde_json::from_str(data)?;
        if let Some(error) = raw.error {
            let message = match error {
                serde_json::Value::String(s) => s,
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| other.to_string()),
            };
            return Ok(FramePayload::Failure(message));
        }

        let content = raw.content.filter(|c| !c.is_empty()).or_else(|| {
            raw.choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.delta.content)
        });

        Ok(match content {
            Some(c) if !c.is_empty() => FramePayload::Fragment(c),
            _ => FramePayload::Empty,
        })
    }

    pub fn fragment_json(content: &str) -> String {
        let fragment = StreamFragment { content: content.to_string() };
        serde_json::to_string(&fragment).unwrap_or_else(|_| r#"{"content":""}"#.to_string())
    }

    pub fn error_json(message: &str) -> String {
        serde_json::to_string(&FrameError { error: message.to_string() }).unwrap_or_else(|_| {
            r#"{"error":"unknown error"}"#.to_string()
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Body of a non-streaming chat response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ChatResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
