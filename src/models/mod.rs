pub mod catalog;
pub mod chat;
pub mod stream;

pub use chat::{ ChatMessage, ChatOptions, Conversation, GenerationParameters, Role };
pub use stream::{ ChatResponse, ErrorBody, FramePayload, StreamFragment, Usage, DONE_MARKER };
