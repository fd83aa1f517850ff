use crate::error::RelayError;

/// Lifecycle of one streaming call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl TranscriptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptState::Completed | TranscriptState::Failed)
    }
}

/// Callbacks for a streaming call. Exactly one of `on_complete` / `on_error`
/// fires per call, after every `on_chunk`.
pub trait TranscriptHandler {
    fn on_start(&mut self) {}
    fn on_chunk(&mut self, _text: &str) {}
    fn on_complete(&mut self) {}
    fn on_error(&mut self, _error: &RelayError) {}
}

/// Accumulates the assistant text of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    buffer: String,
    state: TranscriptState,
    chunks: usize,
    error: Option<RelayError>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            state: TranscriptState::Idle,
            chunks: 0,
            error: None,
        }
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> TranscriptState {
        self.state
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn error(&self) -> Option<&RelayError> {
        self.error.as_ref()
    }
}

impl TranscriptHandler for Transcript {
    fn on_start(&mut self) {
        self.state = TranscriptState::Connecting;
    }

    fn on_chunk(&mut self, text: &str) {
        self.state = TranscriptState::Streaming;
        self.buffer.push_str(text);
        self.chunks += 1;
    }

    fn on_complete(&mut self) {
        self.state = TranscriptState::Completed;
    }

    fn on_error(&mut self, error: &RelayError) {
        self.state = TranscriptState::Failed;
        self.error = Some(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_state_machine() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.state(), TranscriptState::Idle);
        transcript.on_start();
        assert_eq!(transcript.state(), TranscriptState::Connecting);
        transcript.on_chunk("Hel");
        transcript.on_chunk("lo!");
        assert_eq!(transcript.state(), TranscriptState::Streaming);
        transcript.on_complete();
        assert!(transcript.state().is_terminal());
        assert_eq!(transcript.text(), "Hello!");
        assert_eq!(transcript.chunks(), 2);
        assert!(transcript.error().is_none());
    }
}
