//! Newline-delimited JSON framing for row streams.
//!
//! A stream is one `{"totalRows": N}` header line, zero or more row lines and
//! optionally a final `{"error": "..."}` line.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Row;

pub const CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRecord {
    Header {
        #[serde(rename = "totalRows")]
        total_rows: u64,
    },
    Error {
        error: String,
    },
    Row(Row),
}

/// Append `value` as one JSON line to `buf`.
pub fn encode_line<T: Serialize>(value: &T, buf: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *buf, value)?;
    buf.push(b'\n');
    Ok(())
}

pub fn header_line(total_rows: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(24);
    encode_line(&StreamRecord::Header { total_rows }, &mut buf)?;
    Ok(buf)
}

pub fn error_line(message: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    // A string-only record cannot fail to encode.
    let _ = encode_line(&StreamRecord::Error { error: message.to_string() }, &mut buf);
    buf
}

/// Incremental decoder: feed arbitrary chunks, get whole records back.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every complete line in `partial + chunk`; keeps the remainder.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamRecord>> {
        self.partial.extend_from_slice(chunk);
        let mut records = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.partial[start..].iter().position(|&b| b == b'\n') {
            let line = &self.partial[start..start + pos];
            if let Some(record) = Self::decode(line) {
                records.push(record);
            }
            start += pos + 1;
        }
        self.partial.drain(..start);
        records
    }

    /// Decode a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<Result<StreamRecord>> {
        let rest = std::mem::take(&mut self.partial);
        Self::decode(&rest)
    }

    pub fn buffered(&self) -> usize {
        self.partial.len()
    }

    fn decode(line: &[u8]) -> Option<Result<StreamRecord>> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(serde_json::from_slice(line).map_err(Into::into))
    }
}
