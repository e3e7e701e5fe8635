//! Byte-stream view of a session's envelope queues
//!
//! [`HttpReader`] turns the inbound queue of JSON envelopes into an
//! `AsyncRead`, and [`HttpWriter`] turns an `AsyncWrite` into envelopes on the
//! outbound queue. Code layered on top sees ordinary byte streams and never
//! deals with framing.

mod reader;
mod writer;

pub use reader::HttpReader;
pub use writer::HttpWriter;
