//! Frame envelopes with typed bodies.
//!
//! Uses `bytes::Bytes` so call arguments and return values are sliced out of
//! the received payload without copying.
//!
//! # Body layout
//!
//! ```text
//! CallRequest:  u64 correlation id | string operation | signature(32) | args...
//! CallResponse: u64 correlation id | u8 status | value...              (status 0)
//!                                              | u8 error kind | string (status 1)
//! ```
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pactwire::protocol::{CallResponse, Frame};
//!
//! let frame = Frame::CallResponse(CallResponse::success(7, Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 120])));
//! let wire = frame.encode();
//! assert_eq!(&wire[..4], &(1u32 + 8 + 1 + 8).to_be_bytes());
//! assert_eq!(Frame::decode(wire.slice(4..)).unwrap(), frame);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::handshake::{HandshakeRequest, HandshakeResponse};
use super::wire_format::{encode_length, status, FrameKind, LENGTH_PREFIX_SIZE};
use crate::codec::wire::{put_string, WireReader};
use crate::contract::Signature;
use crate::error::{CodecError, DispatchError, DispatchErrorKind, Result, RpcError};

/// A call from invoker to dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub correlation_id: u64,
    pub operation: String,
    /// Signature the invoker expects the operation to have.
    pub signature: Signature,
    /// Encoded argument tuple.
    pub args: Bytes,
}

/// Result carried by a [`CallResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Encoded return value.
    Success(Bytes),
    Failure(DispatchError),
}

/// A dispatcher's answer to one [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub correlation_id: u64,
    pub outcome: CallOutcome,
}

impl CallResponse {
    pub fn success(correlation_id: u64, value: Bytes) -> Self {
        Self {
            correlation_id,
            outcome: CallOutcome::Success(value),
        }
    }

    pub fn failure(correlation_id: u64, error: DispatchError) -> Self {
        Self {
            correlation_id,
            outcome: CallOutcome::Failure(error),
        }
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    CallRequest(CallRequest),
    CallResponse(CallResponse),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::HandshakeRequest(_) => FrameKind::HandshakeRequest,
            Frame::HandshakeResponse(_) => FrameKind::HandshakeResponse,
            Frame::CallRequest(_) => FrameKind::CallRequest,
            Frame::CallResponse(_) => FrameKind::CallResponse,
        }
    }

    /// Correlation id; handshake frames have none.
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            Frame::CallRequest(req) => Some(req.correlation_id),
            Frame::CallResponse(resp) => Some(resp.correlation_id),
            _ => None,
        }
    }

    /// Encode kind byte plus body, without the length prefix.
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.kind().as_byte());

        match self {
            Frame::HandshakeRequest(req) => req.encode_body(&mut buf),
            Frame::HandshakeResponse(resp) => resp.encode_body(&mut buf),
            Frame::CallRequest(req) => {
                buf.put_u64(req.correlation_id);
                put_string(&mut buf, &req.operation);
                buf.put_slice(req.signature.as_bytes());
                buf.put_slice(&req.args);
            }
            Frame::CallResponse(resp) => {
                buf.put_u64(resp.correlation_id);
                match &resp.outcome {
                    CallOutcome::Success(value) => {
                        buf.put_u8(status::SUCCESS);
                        buf.put_slice(value);
                    }
                    CallOutcome::Failure(err) => {
                        buf.put_u8(status::FAILURE);
                        buf.put_u8(err.kind.tag());
                        put_string(&mut buf, &err.message);
                    }
                }
            }
        }

        buf.freeze()
    }

    /// Encode the complete frame, length prefix included.
    pub fn encode(&self) -> Bytes {
        build_frame(&self.encode_payload())
    }

    /// Decode a frame payload (kind byte plus body, no length prefix).
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Protocol` for an unknown kind or a malformed body.
    /// The payload is complete at this point, so a short body is malformed too.
    pub fn decode(payload: Bytes) -> Result<Frame> {
        let kind_byte = *payload
            .first()
            .ok_or_else(|| RpcError::Protocol("Empty frame payload".to_string()))?;
        let kind = FrameKind::from_byte(kind_byte)
            .ok_or_else(|| RpcError::Protocol(format!("Unknown frame kind {}", kind_byte)))?;

        Self::decode_body(kind, &payload)
            .map_err(|e| RpcError::Protocol(format!("Malformed {:?} frame: {}", kind, e)))
    }

    fn decode_body(kind: FrameKind, payload: &Bytes) -> std::result::Result<Frame, CodecError> {
        let mut reader = WireReader::new(&payload[1..]);

        let frame = match kind {
            FrameKind::HandshakeRequest => {
                Frame::HandshakeRequest(HandshakeRequest::decode_body(&mut reader)?)
            }
            FrameKind::HandshakeResponse => {
                Frame::HandshakeResponse(HandshakeResponse::decode_body(&mut reader)?)
            }
            FrameKind::CallRequest => {
                let correlation_id = reader.read_u64()?;
                let operation = reader.read_string()?;
                let signature = Signature::from_bytes(reader.read_fixed()?);
                let args = payload.slice(1 + reader.position()..);
                return Ok(Frame::CallRequest(CallRequest {
                    correlation_id,
                    operation,
                    signature,
                    args,
                }));
            }
            FrameKind::CallResponse => {
                let correlation_id = reader.read_u64()?;
                let outcome = match reader.read_u8()? {
                    status::SUCCESS => {
                        return Ok(Frame::CallResponse(CallResponse::success(
                            correlation_id,
                            payload.slice(1 + reader.position()..),
                        )));
                    }
                    status::FAILURE => {
                        let tag = reader.read_u8()?;
                        let kind = DispatchErrorKind::from_tag(tag).ok_or_else(|| {
                            CodecError::Malformed(format!("unknown error kind {}", tag))
                        })?;
                        CallOutcome::Failure(DispatchError::new(kind, reader.read_string()?))
                    }
                    other => {
                        return Err(CodecError::Malformed(format!(
                            "unknown call status {}",
                            other
                        )))
                    }
                };
                Frame::CallResponse(CallResponse {
                    correlation_id,
                    outcome,
                })
            }
        };

        reader.expect_end()?;
        Ok(frame)
    }
}

impl From<CallRequest> for Frame {
    fn from(req: CallRequest) -> Self {
        Frame::CallRequest(req)
    }
}

impl From<CallResponse> for Frame {
    fn from(resp: CallResponse) -> Self {
        Frame::CallResponse(resp)
    }
}

/// Prefix an encoded payload with its length.
///
/// # Example
///
/// ```
/// use pactwire::protocol::build_frame;
///
/// let bytes = build_frame(&[3, 0xAA]);
/// assert_eq!(&bytes[..], &[0, 0, 0, 2, 3, 0xAA]);
/// ```
pub fn build_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_slice(&encode_length(payload.len() as u32));
    buf.put_slice(payload);
    buf.freeze()
}
