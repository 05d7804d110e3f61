//! Wire-level stream framing
//!
//! Decoders are incremental: `feed` accepts arbitrary chunk boundaries and
//! returns every frame completed so far, holding only the partial residue.
//! `finish` flushes whatever is left once the upstream body ends.

pub mod eventstream;
pub mod jsonl;
pub mod sse;

pub use eventstream::{EventStreamDecoder, EventStreamMessage};
pub use jsonl::JsonLinesDecoder;
pub use sse::{SseDecoder, SseFrame};
