//! Incremental decoder for the job-events SSE stream.

use crate::error::{Error, Result};
use crate::types::JobEvent;

/// Splits Server-Sent Events into `JobEvent`s. Comment-only blocks
/// (keep-alives) are skipped. Bytes are buffered raw and only complete
/// blocks are decoded, so characters split across chunks survive.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Last byte seen was `\r`; a following `\n` belongs to it.
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<JobEvent>> {
        for &b in chunk {
            if std::mem::take(&mut self.after_cr) && b == b'\n' {
                continue;
            }
            if b == b'\r' {
                self.buf.push(b'\n');
                self.after_cr = true;
            } else {
                self.buf.push(b);
            }
        }
        let mut events = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(event) = decode_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }
}

fn decode_block(block: &str) -> Option<Result<JobEvent>> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if data.is_empty() {
        return None;
    }
    Some(serde_json::from_str(&data.join("\n")).map_err(Error::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"event: progress\ndata: {\"type\":\"progr").is_empty());
        let events = dec.push(b"ess\",\"rows\":5}\n\n: keep-alive\n\nevent: done\r\ndata: {\"type\":\"done\"}\r\n\r\n");
        let events: Vec<JobEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![JobEvent::Progress { rows: 5 }, JobEvent::Done]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: {\"type\":\"error\",\"message\":\"café failed\"}\n\n".as_bytes();
        let cut = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut dec = SseDecoder::new();
        assert!(dec.push(&text[..cut]).is_empty());
        let events: Vec<JobEvent> = dec.push(&text[cut..]).into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![JobEvent::Error { message: "café failed".into() }]);
    }

    #[test]
    fn test_bare_carriage_returns_end_lines() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"event: done\rdata: {\"type\":\"done\"}\r").is_empty());
        let events: Vec<JobEvent> = dec.push(b"\r: ping\r\n\r\n").into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![JobEvent::Done]);
    }
}
