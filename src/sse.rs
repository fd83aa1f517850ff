//! Incremental decoding of `text/event-stream` bodies.
//!
//! Network deliveries can cut a line, or a multi-byte character, anywhere.
//! [`LineDecoder`] keeps both partial pieces between calls to [`LineDecoder::push`]
//! and only hands out complete lines.

use log::warn;

/// Prefix of the data field of an event-stream line.
pub const DATA_PREFIX: &str = "data:";

/// Longest line kept before the decoder gives up on it.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug)]
pub struct LineDecoder {
    // incomplete utf-8 sequence from the end of the last delivery
    pending: Vec<u8>,
    line: String,
    max_line: usize,
    // set while skipping the rest of an oversized line
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            line: String::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feeds one delivery and returns every line it completed, without the
    /// trailing `\n` / `\r\n`. Only the newly decoded text is scanned.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let text = self.decode_available();

        let mut lines = Vec::new();
        let mut segments = text.split('\n').peekable();
        while let Some(segment) = segments.next() {
            self.append(segment);
            // the last segment has no newline after it yet
            if segments.peek().is_none() {
                break;
            }
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
        }
        lines
    }

    /// Flushes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.append(&tail);
        }
        let rest = self.take_line()?;
        if rest.is_empty() { None } else { Some(rest) }
    }

    fn append(&mut self, segment: &str) {
        if self.discarding {
            return;
        }
        if self.line.len() + segment.len() > self.max_line {
            warn!("Dropping event-stream line longer than {} bytes", self.max_line);
            self.line.clear();
            self.discarding = true;
            return;
        }
        self.line.push_str(segment);
    }

    fn take_line(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        let mut line = std::mem::take(&mut self.line);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    fn decode_available(&mut self) -> String {
        let mut out = String::new();
        loop {
            let (valid, invalid) = match std::str::from_utf8(&self.pending) {
                Ok(_) => (self.pending.len(), None),
                Err(e) => (e.valid_up_to(), e.error_len()),
            };
            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
            match invalid {
                Some(len) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + len);
                }
                None => {
                    // anything left is the start of a sequence cut by the delivery
                    self.pending.drain(..valid);
                    return out;
                }
            }
        }
    }
}

/// Returns the payload of a `data:` line, or `None` for any other line
/// (comments, `event:`, blank separators).
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

/// Encodes one frame: `data: <payload>\n\n`.
pub fn frame(payload: &str) -> String {
    format!("{} {}\n\n", DATA_PREFIX, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"data: one\n\ndata: two\r\n\r\n");
        assert_eq!(lines, vec!["data: one", "", "data: two", ""]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn buffers_a_line_cut_across_deliveries() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(br#"data: {"cont"#).is_empty());
        let lines = decoder.push(b"ent\":\"Hel\"}\n\n");
        assert_eq!(lines, vec![r#"data: {"content":"Hel"}"#, ""]);
    }

    #[test]
    fn carries_a_split_multibyte_character() {
        let text = "data: ñandú ☕\n";
        let bytes = text.as_bytes();
        // cut inside 'ñ' (2 bytes) and inside '☕' (3 bytes)
        let first = 7;
        let second = bytes.len() - 2;
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&bytes[..first]).is_empty());
        assert!(decoder.push(&bytes[first..second]).is_empty());
        let lines = decoder.push(&bytes[second..]);
        assert_eq!(lines, vec!["data: ñandú ☕"]);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let text = "data: {\"content\":\"héllo\"}\n\ndata: [DONE]\n\n";
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        for b in text.as_bytes() {
            lines.extend(decoder.push(std::slice::from_ref(b)));
        }
        assert_eq!(lines, vec!["data: {\"content\":\"héllo\"}", "", "data: [DONE]", ""]);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"a\xffb\n");
        assert_eq!(lines, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: [DONE]"));
    }

    #[test]
    fn oversized_line_is_dropped_and_decoding_resumes() {
        let mut decoder = LineDecoder::with_max_line(12);
        assert!(decoder.push(b"data: 0123456").is_empty());
        let lines = decoder.push(b"789\ndata: ok\n");
        assert_eq!(lines, vec!["data: ok"]);

        assert!(decoder.push(b"data: far too long\n").is_empty());
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: tail"));
    }

    #[test]
    fn extracts_data_payloads() {
        assert_eq!(data_payload("data: [DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(frame("[DONE]"), "data: [DONE]\n\n");
    }
}
