//! Wire format constants and the length prefix.
//!
//! Every frame on the wire is:
//! ```text
//! ┌──────────┬──────┬─────────────────────┐
//! │ Length   │ Kind │ Body                │
//! │ 4 bytes  │ 1 B  │ Length - 1 bytes    │
//! │ uint32 BE│      │                     │
//! └──────────┴──────┴─────────────────────┘
//! ```
//!
//! The length counts the kind byte plus the body, never itself.
//! All multi-byte integers are Big Endian.

use crate::error::{Result, RpcError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Absolute maximum frame payload size (~2 GB, max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Frame kind tag, the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    HandshakeRequest = 0,
    HandshakeResponse = 1,
    CallRequest = 2,
    CallResponse = 3,
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::HandshakeRequest),
            1 => Some(Self::HandshakeResponse),
            2 => Some(Self::CallRequest),
            3 => Some(Self::CallResponse),
            _ => None,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this kind belongs to the handshake phase.
    #[inline]
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::HandshakeRequest | Self::HandshakeResponse)
    }
}

/// Status byte values.
pub mod status {
    /// HandshakeResponse: all required operations are present.
    pub const COMPATIBLE: u8 = 0;
    /// HandshakeResponse: some required operations are missing.
    pub const INCOMPATIBLE: u8 = 1;
    /// CallResponse: body is the encoded return value.
    pub const SUCCESS: u8 = 0;
    /// CallResponse: body is an error kind plus message.
    pub const FAILURE: u8 = 1;
}

/// Encode a payload length as the frame prefix.
#[inline]
pub fn encode_length(len: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    len.to_be_bytes()
}

/// Decode the frame prefix.
///
/// Returns `None` if the buffer is too short.
#[inline]
pub fn decode_length(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}

/// Validate a declared payload length.
///
/// Checks:
/// - Length is non-zero (every payload carries a kind byte)
/// - Length doesn't exceed max
pub fn validate_length(len: u32, max_frame_size: u32) -> Result<()> {
    if len == 0 {
        return Err(RpcError::Protocol(
            "Zero-length frame has no kind byte".to_string(),
        ));
    }

    if len > max_frame_size {
        return Err(RpcError::Protocol(format!(
            "Frame size {} exceeds maximum {}",
            len, max_frame_size
        )));
    }

    Ok(())
}
