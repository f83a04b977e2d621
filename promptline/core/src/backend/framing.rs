//! Byte and line framing for streamed response bodies.

/// Incremental UTF-8 decoder
///
/// Network fragments can split a multi-byte character. The incomplete tail is
/// held back and completed by the next fragment. Invalid sequences decode to
/// U+FFFD rather than failing the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next fragment, returning all text that is complete so far
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still buffered at end of stream
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Newline splitter that keeps the incomplete trailing line
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Take the next complete line, without its `\n`
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.find('\n')?;
        let line = self.buffer[..pos].to_string();
        self.buffer.drain(..=pos);
        Some(line)
    }

    /// Take the incomplete remainder, leaving the buffer empty
    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_split_multibyte() {
        let bytes = "héllo 🌍".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for b in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(b)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "héllo 🌍");
    }

    #[test]
    fn test_utf8_holds_incomplete_tail() {
        let euro = "€".as_bytes(); // 3 bytes
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&euro[..2]), "");
        assert_eq!(decoder.decode(&euro[2..]), "€");
    }

    #[test]
    fn test_utf8_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&"€".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_line_buffer() {
        let mut lines = LineBuffer::new();
        lines.push("one\ntw");
        assert_eq!(lines.next_line().as_deref(), Some("one"));
        assert_eq!(lines.next_line(), None);

        lines.push("o\n\nthree");
        assert_eq!(lines.next_line().as_deref(), Some("two"));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_remainder(), "three");
        assert!(lines.is_empty());
    }
}
