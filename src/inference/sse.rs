//! # SSE Decoder
//!
//! Turns a raw byte stream into a lazy sequence of parsed `data:` payloads.
//! Provider agnostic: what an event *means* is decided by the provider's
//! `extract_stream_delta`.
//!
//! ```text
//! bytes ──► LineSplitter ──► parse_data_line ──► Option<Value>
//!           (buffers across      `data: [DONE]` ends the sequence
//!            chunk boundaries)   `data: <bad json>` yields None
//!                                anything else is skipped
//! ```

use std::collections::VecDeque;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use log::{debug, warn};
use serde_json::Value;

use super::provider::ProviderError;
use super::transport::ByteStream;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles complete lines from arbitrarily sized chunks.
///
/// Works on bytes so a multi-byte character split across two network
/// chunks is decoded only once both halves have arrived.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `chunk` and returns every line it completed, without the
    /// trailing `\n` (and `\r`, for servers that send CRLF).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        for pos in self.scanned..self.buffer.len() {
            if self.buffer[pos] == b'\n' {
                lines.push(Self::decode_line(&self.buffer[start..pos]));
                start = pos + 1;
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Flushes the trailing partial line, if any, once the source has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        Some(Self::decode_line(&line))
    }

    fn decode_line(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Classification of a single SSE line.
#[derive(Debug, Clone, PartialEq)]
pub enum DataLine {
    Event(Value),
    /// `data:` payload that isn't JSON. Logged and reported as a null marker.
    Malformed,
    /// `data: [DONE]`
    Done,
}

/// Classifies `line`. Returns None for lines that aren't `data: ` lines
/// (blank separators, `event:` lines, comments).
pub fn parse_data_line(line: &str) -> Option<DataLine> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    if data.trim() == DONE_SENTINEL {
        return Some(DataLine::Done);
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(DataLine::Event(value)),
        Err(e) => {
            warn!("Skipping malformed SSE frame ({e}): {data}");
            Some(DataLine::Malformed)
        }
    }
}

struct DecodeState {
    input: ByteStream,
    splitter: LineSplitter,
    lines: VecDeque<String>,
    input_done: bool,
}

/// Lazily decodes `input` into parsed events.
///
/// Yields `Ok(Some(event))` per JSON frame and `Ok(None)` per malformed
/// frame. Ends cleanly on `[DONE]` or when the input ends. A transport
/// error is yielded once and ends the sequence.
pub fn decode(input: ByteStream) -> BoxStream<'static, Result<Option<Value>, ProviderError>> {
    let state = DecodeState {
        input,
        splitter: LineSplitter::new(),
        lines: VecDeque::new(),
        input_done: false,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(line) = state.lines.pop_front() {
                match parse_data_line(&line) {
                    Some(DataLine::Event(event)) => return Some((Ok(Some(event)), Some(state))),
                    Some(DataLine::Malformed) => return Some((Ok(None), Some(state))),
                    Some(DataLine::Done) => {
                        debug!("Received [DONE] marker");
                        return None;
                    }
                    None => continue,
                }
            }

            if state.input_done {
                return None;
            }

            match state.input.next().await {
                Some(Ok(chunk)) => {
                    debug!("Raw chunk received: {} bytes", chunk.len());
                    let lines = state.splitter.feed(&chunk);
                    state.lines.extend(lines);
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    state.input_done = true;
                    let tail = state.splitter.finish();
                    state.lines.extend(tail);
                }
            }
        }
    })
    .boxed()
}
