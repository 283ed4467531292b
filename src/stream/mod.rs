//! Streaming of query results as newline-delimited JSON.

pub mod codec;
mod executor;

pub use codec::{encode_line, LineDecoder, StreamRecord, CONTENT_TYPE};
pub use executor::{RowStream, StreamExecutor};
