//! Streaming Chat Protocol
//!
//! The chat endpoint answers with a newline-delimited text stream. Each record
//! line carries one typed JSON payload:
//!
//! ```text
//! data: {"type":"references","data":[{"file_path":"src/lib.rs", ...}]}
//!
//! data: {"type":"content","data":"The server starts in "}
//!
//! data: {"type":"content","data":"main.rs"}
//!
//! data: [DONE]
//! ```
//!
//! # Layers
//!
//! - [`FrameDecoder`]: push-based, synchronous. Feed it raw byte chunks in
//!   arrival order and it hands back complete [`Frame`]s. Partial lines are
//!   held until the rest arrives.
//! - [`EventStream`]: wraps a response body and exposes a lazy
//!   `Stream<Item = Result<ProtocolEvent, ClientError>>`. Dropping it releases
//!   the underlying connection.
//!
//! # Recovery
//!
//! A record whose payload is not valid JSON is logged and skipped. The stream
//! keeps going. A stream that closes without `[DONE]` ends normally.

mod decoder;
mod event_stream;
mod events;

pub use decoder::{DecoderStats, Frame, FrameDecoder, DONE_SENTINEL, RECORD_PREFIX};
pub use event_stream::EventStream;
pub use events::ProtocolEvent;
