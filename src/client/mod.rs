//! Client side of the row stream: page sources, the accumulating consumer
//! and decoding of job events.

mod consumer;
mod source;
pub mod sse;

pub use consumer::{ConsumerSnapshot, FetchOutcome, StreamConsumer, DEFAULT_FLUSH_THRESHOLD};
pub use source::{ByteStream, LocalSource, PageSource};
#[cfg(feature = "http-client")]
pub use source::HttpSource;
pub use sse::SseDecoder;
