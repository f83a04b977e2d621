//! Event-stream framer
//!
//! Buffers decoded text and yields complete event-stream records.
//!
//! ```text
//! event: message        <- optional event type
//! data: {"choices":...} <- payload line (may repeat; joined with '\n')
//! : keep-alive          <- comment, ignored
//!                       <- blank line dispatches the record
//! ```
//!
//! Lines end with LF, CRLF or a bare CR. Records without any `data` are not
//! dispatched. A record that is still open when the body ends is dropped.

use std::collections::VecDeque;

use super::framing::LineBuffer;

/// One complete event-stream record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event` field, if any
    pub event: Option<String>,
    /// Joined `data` lines
    pub data: String,
    /// Value of the `id` field, if any
    pub id: Option<String>,
}

/// Incremental event-stream parser
#[derive(Debug, Default)]
pub struct SseFramer {
    lines: LineBuffer,
    /// Record being assembled
    current: SseEvent,
    /// Whether the current record has seen a `data` field
    has_data: bool,
    /// Complete records not yet taken
    ready: VecDeque<SseEvent>,
    /// Whether the start of the stream (and a possible BOM) has been seen
    started: bool,
    /// Whether the last character fed was a CR
    after_cr: bool,
}

impl SseFramer {
    /// Create an empty framer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text
    pub fn feed(&mut self, text: &str) {
        let text = if self.started {
            text
        } else if text.is_empty() {
            return;
        } else {
            self.started = true;
            text.strip_prefix('\u{FEFF}').unwrap_or(text)
        };

        let text = self.normalize_line_ends(text);
        self.lines.push(&text);
        while let Some(line) = self.lines.next_line() {
            self.process_line(&line);
        }
    }

    /// Rewrite CR and CRLF line ends as LF
    ///
    /// A CR ends its line at once; a LF that follows it, even in the next
    /// feed, is dropped.
    fn normalize_line_ends(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            let after_cr = std::mem::replace(&mut self.after_cr, c == '\r');
            match c {
                '\r' => out.push('\n'),
                '\n' if after_cr => {}
                c => out.push(c),
            }
        }
        out
    }

    /// Take the next complete record
    pub fn next_event(&mut self) -> Option<SseEvent> {
        self.ready.pop_front()
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.current.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.current.id = Some(value.to_string());
                }
            }
            // retry and unknown fields carry nothing the core uses
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event = std::mem::take(&mut self.current);
        let has_data = std::mem::replace(&mut self.has_data, false);
        if has_data && !event.data.is_empty() {
            self.ready.push_back(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(framer: &mut SseFramer) -> Vec<SseEvent> {
        std::iter::from_fn(|| framer.next_event()).collect()
    }

    #[test]
    fn test_single_event() {
        let mut framer = SseFramer::new();
        framer.feed("data: hello\n\n");
        let events = collect(&mut framer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_split_across_feeds() {
        let mut framer = SseFramer::new();
        framer.feed("da");
        framer.feed("ta: {\"a\":");
        assert!(framer.next_event().is_none());
        framer.feed("1}\r\n");
        assert!(framer.next_event().is_none());
        framer.feed("\r\n");
        assert_eq!(framer.next_event().unwrap().data, "{\"a\":1}");
    }

    #[test]
    fn test_multiline_data_and_fields() {
        let mut framer = SseFramer::new();
        framer.feed("event: delta\nid: 7\ndata: one\ndata:two\nretry: 100\n\n");
        let event = framer.next_event().unwrap();
        assert_eq!(event.event.as_deref(), Some("delta"));
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.data, "one\ntwo");
    }

    #[test]
    fn test_comments_and_empty_records_skipped() {
        let mut framer = SseFramer::new();
        framer.feed(": keep-alive\n\nevent: ping\n\ndata:\n\ndata: x\n\n");
        let events = collect(&mut framer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_bare_cr_line_ends() {
        let mut framer = SseFramer::new();
        framer.feed("data: one\r\rdata: two\r");
        assert_eq!(framer.next_event().unwrap().data, "one");
        assert!(framer.next_event().is_none());
        framer.feed("\r");
        assert_eq!(framer.next_event().unwrap().data, "two");
    }

    #[test]
    fn test_crlf_split_between_feeds() {
        let mut framer = SseFramer::new();
        framer.feed("data: a\r");
        framer.feed("\ndata: b\r");
        assert!(framer.next_event().is_none());
        framer.feed("\n\r\n");
        assert_eq!(framer.next_event().unwrap().data, "a\nb");
    }

    #[test]
    fn test_bom_and_unterminated_tail() {
        let mut framer = SseFramer::new();
        framer.feed("\u{FEFF}data: first\n\ndata: partial");
        let events = collect(&mut framer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first");
    }
}
