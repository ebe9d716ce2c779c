//! Protocol module containing message types and the binary frame codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_frame, decode_message, decode_payload, encode_frame, encode_message, Frame,
    FramingError,
};
pub use messages::*;
