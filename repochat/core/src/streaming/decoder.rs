//! Frame Decoder
//!
//! Turns raw response bytes into protocol frames. Network deliveries are
//! arbitrary: a record line, or even a multi-byte UTF-8 character, can be cut
//! anywhere. The decoder keeps the unterminated tail of each delivery in a
//! byte buffer and only decodes a line once its newline has arrived.

use super::events::ProtocolEvent;

/// Literal prefix of a record line
pub const RECORD_PREFIX: &str = "data:";

/// Payload that marks the normal end of a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A typed protocol event
    Event(ProtocolEvent),
    /// The `[DONE]` sentinel; nothing after it is decoded
    Done,
}

/// Counters for one decoded stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Raw bytes fed in (including any discarded after `[DONE]`)
    pub bytes_received: u64,
    /// Events successfully decoded
    pub events_decoded: u64,
    /// Record lines skipped because the payload was not a valid event
    pub malformed_frames: u64,
    /// Non-empty lines without the record prefix (comments, keep-alives)
    pub ignored_lines: u64,
    /// Whether the `[DONE]` sentinel was seen
    pub saw_done: bool,
}

/// Push-based decoder for `data:` framed event streams
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of the current unterminated line
    buffer: Vec<u8>,
    /// Set after `[DONE]` or [`FrameDecoder::finish`]
    finished: bool,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder has stopped producing frames
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decoder counters
    #[must_use]
    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Bytes held waiting for a line terminator
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one network delivery and return every frame it completes
    ///
    /// Stops at `[DONE]`: the sentinel is the last frame returned and any
    /// bytes after it are dropped. Once finished, further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        self.stats.bytes_received += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = end + 1;

            if let Some(frame) = self.decode_line(&line) {
                let done = frame == Frame::Done;
                frames.push(frame);
                if done {
                    self.stop_at_sentinel(consumed);
                    return frames;
                }
            }
        }

        self.buffer.drain(..consumed);
        frames
    }

    /// Signal end of input and decode any final unterminated line
    pub fn finish(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if self.buffer.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();

        let frame = self.decode_line(&line);
        if frame == Some(Frame::Done) {
            self.stats.saw_done = true;
        }
        frame
    }

    fn stop_at_sentinel(&mut self, consumed: usize) {
        let discarded = self.buffer.len() - consumed;
        self.buffer.clear();
        self.finished = true;
        self.stats.saw_done = true;

        if discarded > 0 {
            tracing::debug!(discarded_bytes = discarded, "Discarding bytes after [DONE]");
        }
    }

    fn decode_line(&mut self, raw: &str) -> Option<Frame> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        let Some(payload) = line.strip_prefix(RECORD_PREFIX) else {
            if !line.is_empty() {
                self.stats.ignored_lines += 1;
                tracing::trace!(line_len = line.len(), "Ignoring non-record line");
            }
            return None;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload.trim() == DONE_SENTINEL {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<ProtocolEvent>(payload) {
            Ok(event) => {
                self.stats.events_decoded += 1;
                tracing::trace!(kind = event.kind(), "Decoded stream event");
                Some(Frame::Event(event))
            }
            Err(e) => {
                self.stats.malformed_frames += 1;
                tracing::warn!(
                    error = %e,
                    payload_len = payload.len(),
                    "Skipping malformed stream frame"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn content(text: &str) -> Frame {
        Frame::Event(ProtocolEvent::Content(text.to_string()))
    }

    #[test]
    fn test_two_records_then_done() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {\"type\":\"content\",\"data\":\"Hel\"}\n\ndata: {\"type\":\"content\",\"data\":\"lo\"}\n\ndata: [DONE]\n\n",
        );

        assert_eq!(frames, vec![content("Hel"), content("lo"), Frame::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.stats().saw_done);
        assert_eq!(decoder.stats().events_decoded, 2);
    }

    #[test]
    fn test_line_split_across_deliveries() {
        let mut decoder = FrameDecoder::new();

        let first = decoder.feed(b"data: {\"type\":\"con");
        assert!(first.is_empty());
        assert_eq!(decoder.buffered_len(), 18);

        let second = decoder.feed(b"tent\",\"data\":\"x\"}\n\n");
        assert_eq!(second, vec![content("x")]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"data: {\"type\":\"content\",\"data\":\"a\"}\n\ndata: {\"type\":\"content\",\"data\":\"b\"}\n\n";
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in input {
            frames.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, vec![content("a"), content("b")]);
    }

    #[test]
    fn test_multibyte_char_split_across_deliveries() {
        let line = "data: {\"type\":\"content\",\"data\":\"caf\u{e9}\"}\n".as_bytes();
        // Split inside the two-byte encoding of 'é'
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        assert_eq!(decoder.feed(&line[split..]), vec![content("café")]);
    }

    #[test]
    fn test_malformed_payload_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {not json}\n\ndata: [DONE]\n\n");

        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(decoder.stats().malformed_frames, 1);
        assert_eq!(decoder.stats().events_decoded, 0);
    }

    #[test]
    fn test_malformed_payload_does_not_stop_decoding() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {\"type\":\"content\",\"data\":\"a\"}\ndata: {broken\ndata: {\"type\":\"content\",\"data\":\"b\"}\n",
        );
        assert_eq!(frames, vec![content("a"), content("b")]);
        assert_eq!(decoder.stats().malformed_frames, 1);
    }

    #[test]
    fn test_non_record_lines_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b": keep-alive\nevent: message\ndata: {\"type\":\"content\",\"data\":\"x\"}\n\n",
        );
        assert_eq!(frames, vec![content("x")]);
        assert_eq!(decoder.stats().ignored_lines, 2);
    }

    #[test]
    fn test_crlf_and_missing_space() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data:{\"type\":\"content\",\"data\":\"x\"}\r\n\r\ndata:[DONE]\r\n");
        assert_eq!(frames, vec![content("x"), Frame::Done]);
    }

    #[test]
    fn test_bytes_after_done_dropped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: [DONE]\n\ndata: {\"type\":\"content\",\"data\":\"late\"}\n\n",
        );
        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(decoder.buffered_len(), 0);

        // Later deliveries are ignored too
        let frames = decoder.feed(b"data: {\"type\":\"content\",\"data\":\"later\"}\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_finish_decodes_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder
            .feed(b"data: {\"type\":\"content\",\"data\":\"tail\"}")
            .is_empty());

        assert_eq!(decoder.finish(), Some(content("tail")));
        assert!(decoder.is_finished());
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_finish_with_empty_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: {\"type\":\"content\",\"data\":\"x\"}\n");
        assert_eq!(decoder.finish(), None);
        assert!(!decoder.stats().saw_done);
    }

    #[test]
    fn test_references_then_content() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {\"type\":\"references\",\"data\":[{\"file_path\":\"m.go\",\"start_line\":1,\"end_line\":4,\"code_snippet\":\"package main\"}]}\n\ndata: {\"type\":\"content\",\"data\":\"See m.go\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Event(ProtocolEvent::References(r)) if r.len() == 1));
        assert_eq!(frames[1], content("See m.go"));
    }
}
