//! Streaming SSE scanner.
//!
//! Fed one byte slice at a time via [`SseFramer::push`], it reassembles
//! complete lines across call boundaries, accumulates `data:` lines per the
//! SSE multi-line rule, and dispatches a fully-formed [`SseEvent`] on each
//! blank line. It does not own or advance any I/O itself — the proxy engine
//! drives it from upstream response chunks, and tests drive it directly
//! with hand-built fragments.

/// One dispatched SSE event. `event` is `None` when the stream used the
/// implicit `"message"` event type (no `event:` field was sent).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

#[derive(Debug, Default)]
pub struct SseFramer {
    buf: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
    saw_field: bool,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the upstream body. Returns every event
    /// completed by this chunk; a chunk that ends mid-line or mid-event
    /// yields nothing and is remembered for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some((line_end, next_start)) = find_line_end(&self.buf) {
            let line: Vec<u8> = self.buf[..line_end].to_vec();
            self.buf.drain(..next_start);
            self.process_line(&line, &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if self.saw_field {
                events.push(SseEvent {
                    event: self.event.take(),
                    data: self.data_lines.join("\n"),
                    id: self.id.clone(),
                    retry: self.retry.take(),
                });
            }
            self.data_lines.clear();
            self.saw_field = false;
            return;
        }

        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line.as_ref(), ""),
        };

        self.saw_field = true;
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            },
            _ => {},
        }
    }
}

/// Finds the next line terminator in `buf`, honoring `\n`, `\r\n`, and bare
/// `\r`. Returns `(line_end, next_line_start)`, or `None` if the buffer
/// holds no complete line yet — including the case of a trailing `\r` that
/// might still turn into `\r\n` once more bytes arrive.
fn find_line_end(buf: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buf.len() {
        match buf[i] {
            b'\n' => return Some((i, i + 1)),
            b'\r' => {
                return if i + 1 < buf.len() {
                    if buf[i + 1] == b'\n' {
                        Some((i, i + 2))
                    } else {
                        Some((i, i + 1))
                    }
                } else {
                    None
                };
            },
            _ => {},
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_single_event_on_blank_line() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"event: message\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn joins_multiline_data_with_newline() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn ignores_comment_lines() {
        let mut framer = SseFramer::new();
        let events = framer.push(b": keep-alive\ndata: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn handles_id_and_retry_fields() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"id: 42\nretry: 3000\ndata: hi\n\n");
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].retry, Some(3000));
    }

    #[test]
    fn no_event_without_blank_line() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: hi");
        assert!(events.is_empty());
    }

    #[test]
    fn reassembles_event_split_across_pushes() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: hel").is_empty());
        assert!(framer.push(b"lo\n").is_empty());
        let events = framer.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn handles_split_crlf_terminator() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: hi\r").is_empty());
        let events = framer.push(b"\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn two_events_in_one_chunk() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn blank_line_with_no_preceding_field_dispatches_nothing() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn field_without_colon_is_treated_as_empty_value() {
        let mut framer = SseFramer::new();
        let events = framer.push(b"data\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }
}
