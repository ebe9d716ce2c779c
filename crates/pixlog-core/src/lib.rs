//! # pixlog-core
//!
//! Shared library for pixlog containing the wire protocol messages and the
//! binary frame codec.
//!
//! This crate is used by both the producer-side client and the viewer-hosting
//! server. It has zero dependencies on OS APIs, GUI frameworks, or network
//! sockets: it only turns typed messages into byte frames and back.
//!
//! The system it serves is a two-process image logger. A lightweight producer
//! process (a numeric experiment, a vision pipeline, a test script) streams
//! image buffers and control commands over a local TCP connection to a
//! long-lived viewer-hosting process, so the producer never blocks on
//! rendering. Everything that crosses that connection is a [`Frame`]: a 4-byte
//! kind, an 8-byte payload length, and the payload, all little-endian.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `pixlog_core::LogMessage` instead of `pixlog_core::protocol::messages::LogMessage`.
pub use protocol::codec::{
    decode_frame, decode_message, decode_payload, encode_frame, encode_message, Frame,
    FramingError,
};
pub use protocol::messages::{
    FigureMessage, FrameKind, ImageMessage, LogMessage, SampleType, HEADER_SIZE, PROTOCOL_VERSION,
};
