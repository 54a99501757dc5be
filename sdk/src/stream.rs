//! Incremental decoder for the gateway's event stream
//!
//! The gateway writes one `data: <JSON>` line per event followed by a blank
//! line. Chunks arriving from the network may split a line anywhere (including
//! inside a multi-byte character), so the decoder buffers raw bytes and only
//! parses complete lines. Comment lines (keep-alives) and lines that do not
//! parse as a [`StreamEvent`] are skipped.

use crate::types::StreamEvent;

const DATA_PREFIX: &str = "data:";

/// Buffers partial input and yields complete events
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a newline
    scanned: usize,
    skipped: usize,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every event completed by it
    ///
    /// Only the new bytes are searched, and consumed lines are removed from
    /// the buffer once per call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let line_end = search_from + offset;
            let line = String::from_utf8_lossy(&self.buffer[line_start..line_end]).into_owned();
            if let Some(event) = self.parse_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
            line_start = line_end + 1;
            search_from = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        events
    }

    /// Number of `data:` lines that could not be parsed so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        match serde_json::from_str(payload.trim_start()) {
            Ok(event) => Some(event),
            Err(_) => {
                self.skipped += 1;
                None
            }
        }
    }
}

/// Decode a complete stream body in one go
pub fn decode_all(body: &str) -> Vec<StreamEvent> {
    let mut decoder = EventStreamDecoder::new();
    let mut events = decoder.feed(body.as_bytes());
    // A final line without a trailing newline is still a complete frame.
    events.extend(decoder.feed(b"\n"));
    events
}
