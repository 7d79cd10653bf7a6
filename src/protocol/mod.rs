//! Wire protocol: length-prefixed frames and the handshake.

mod frame;
mod frame_buffer;
mod handshake;
mod wire_format;

pub use frame::{build_frame, CallOutcome, CallRequest, CallResponse, Frame};
pub use frame_buffer::FrameBuffer;
pub use handshake::{negotiate, HandshakeRequest, HandshakeResponse};
pub use wire_format::{
    decode_length, encode_length, status, validate_length, FrameKind, ABSOLUTE_MAX_FRAME_SIZE,
    DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
};
