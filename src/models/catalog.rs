//! Well-known OpenRouter model identifiers.

pub const GPT_4O: &str = "openai/gpt-4o";
pub const GPT_4O_MINI: &str = "openai/gpt-4o-mini";
pub const GPT_4_TURBO: &str = "openai/gpt-4-turbo";

pub const CLAUDE_SONNET: &str = "anthropic/claude-3.5-sonnet";
pub const CLAUDE_OPUS: &str = "anthropic/claude-3-opus";
pub const CLAUDE_HAIKU: &str = "anthropic/claude-3-haiku";

pub const GEMINI_PRO: &str = "google/gemini-pro-1.5";
pub const GEMINI_FLASH: &str = "google/gemini-flash-1.5";

pub const LLAMA_3_70B: &str = "meta-llama/llama-3-70b-instruct";
pub const LLAMA_3_8B: &str = "meta-llama/llama-3-8b-instruct";

// Rate limited
pub const FREE_GPT_3_5: &str = "openai/gpt-3.5-turbo";
pub const FREE_LLAMA_3_8B: &str = "meta-llama/llama-3-8b-instruct:free";

pub const ALL: &[&str] = &[
    GPT_4O,
    GPT_4O_MINI,
    GPT_4_TURBO,
    CLAUDE_SONNET,
    CLAUDE_OPUS,
    CLAUDE_HAIKU,
    GEMINI_PRO,
    GEMINI_FLASH,
    LLAMA_3_70B,
    LLAMA_3_8B,
    FREE_GPT_3_5,
    FREE_LLAMA_3_8B,
];

pub fn is_known(model: &str) -> bool {
    ALL.contains(&model)
}
