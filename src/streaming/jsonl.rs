//! Streaming decoder for newline-delimited JSON events

use crate::error::RecordError;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One step of the decoder
#[derive(Debug)]
pub enum JsonlRecord {
    Event(Value),
    Malformed(RecordError),
}

/// Pulls one JSON value per call out of a byte stream.
///
/// Values are normally one per line but may span several lines. When a
/// record does not parse, the rest of its physical line is dropped and
/// decoding resumes on the next line, so one bad record never ends the
/// stream. Stop early by simply not calling [`next_record`] again.
///
/// [`next_record`]: JsonLinesDecoder::next_record
pub struct JsonLinesDecoder<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    line: usize,
    eof: bool,
    scan: BracketScan,
    /// Size `pending` must reach before an open value is parsed again
    retry_at: usize,
}

/// Tracks bracket depth of the value at the front of `pending` so lines of
/// an open object or array are only scanned once.
#[derive(Debug, Default)]
struct BracketScan {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    closed: bool,
}

impl BracketScan {
    /// Scan `bytes` from where the last call stopped; true once the opening
    /// bracket has been balanced.
    fn advance(&mut self, bytes: &[u8]) -> bool {
        while !self.closed && self.pos < bytes.len() {
            let byte = bytes[self.pos];
            self.pos += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.closed = self.depth == 0;
                }
                _ => {}
            }
        }
        self.closed
    }
}

impl<R: AsyncRead + Unpin> JsonLinesDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            line: 1,
            eof: false,
            scan: BracketScan::default(),
            retry_at: 0,
        }
    }

    /// Next event or malformed record; `Ok(None)` at end of stream.
    /// Read errors are returned as `Err` and end decoding.
    pub async fn next_record(&mut self) -> std::io::Result<Option<JsonlRecord>> {
        loop {
            self.skip_whitespace();

            if self.pending.is_empty() {
                if self.eof {
                    return Ok(None);
                }
                self.fill().await?;
                continue;
            }

            // Always parse with at least one complete line buffered
            if !self.eof && !self.pending.ends_with(b"\n") {
                self.fill().await?;
                continue;
            }

            // An open object or array is parsed again only once its brackets
            // balance or the buffer has doubled
            let structured = matches!(self.pending[0], b'{' | b'[');
            if structured
                && !self.eof
                && !self.scan.advance(&self.pending)
                && self.pending.len() < self.retry_at
            {
                self.fill().await?;
                continue;
            }

            let parsed = {
                let mut values =
                    serde_json::Deserializer::from_slice(&self.pending).into_iter::<Value>();
                values
                    .next()
                    .map(|parsed| parsed.map(|value| (value, values.byte_offset())))
            };
            match parsed {
                Some(Ok((value, used))) => {
                    self.consume(used);
                    return Ok(Some(JsonlRecord::Event(value)));
                }
                // The value continues on the next line
                Some(Err(e)) if e.is_eof() && !self.eof => {
                    self.retry_at = self.pending.len() * 2;
                    self.fill().await?;
                }
                Some(Err(e)) => {
                    let line = self.line;
                    let raw = self.discard_line();
                    return Ok(Some(JsonlRecord::Malformed(RecordError::new(line, &raw, e))));
                }
                None => {
                    let all = self.pending.len();
                    self.consume(all);
                }
            }
        }
    }

    /// Line number the next record starts on
    pub fn line(&self) -> usize {
        self.line
    }

    async fn fill(&mut self) -> std::io::Result<()> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let blank = self
            .pending
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        if blank > 0 {
            self.consume(blank);
        }
    }

    fn discard_line(&mut self) -> Vec<u8> {
        let end = self
            .pending
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(self.pending.len());
        let raw = self.pending[..end].to_vec();
        self.consume(end);
        raw
    }

    fn consume(&mut self, count: usize) {
        self.line += self.pending[..count].iter().filter(|&&b| b == b'\n').count();
        self.pending.drain(..count);
        self.scan = BracketScan::default();
        self.retry_at = 0;
    }
}

/// Compact JSON with object keys sorted at every level
pub fn canonical_json(value: Value) -> String {
    sort_keys(value).to_string()
}

// `Map` keeps insertion order if `preserve_order` is enabled by another crate in the build
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
