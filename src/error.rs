//! Error types for pactwire.
//!
//! Errors are split by the boundary they may cross:
//!
//! - [`CodecError`] and [`DispatchError`] are per-call data. They travel inside
//!   response frames and never end a session.
//! - [`ContractError`] is raised while a contract is being built.
//! - [`TransportError`], [`RpcError::ProtocolMismatch`] and
//!   [`RpcError::Protocol`] end the session they occur in.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::codec::TypeDescriptor;
use crate::contract::OperationRef;

/// Error raised while encoding or decoding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before the value was complete.
    ///
    /// Recoverable: buffer more bytes and decode again from the start of the value.
    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Bytes are present but do not form a valid encoding.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Union discriminant outside the declared branch set.
    #[error("unknown union discriminant {0}")]
    UnknownDiscriminant(u32),

    /// Value shape does not match the codec's descriptor.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

impl CodecError {
    /// Only `InsufficientData` can be fixed by reading more bytes.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::InsufficientData { .. })
    }

    pub(crate) fn mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        CodecError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Error raised while assembling a codec registry or a contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("operation `{0}` is already declared")]
    DuplicateOperation(String),

    #[error("a different codec is already registered for {0}")]
    DuplicateCodec(TypeDescriptor),

    #[error("no codec registered for {0}")]
    CodecNotFound(TypeDescriptor),

    #[error("operation `{operation}` references {descriptor}, which has no codec")]
    MissingCodec {
        operation: String,
        descriptor: TypeDescriptor,
    },

    #[error("union discriminant {0} is declared twice")]
    DuplicateDiscriminant(u32),

    /// A handler was registered for a name the contract does not declare.
    #[error("operation `{0}` is not declared in the contract")]
    UndeclaredOperation(String),
}

/// Category of a per-call failure reported by the dispatcher.
///
/// The discriminant is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DispatchErrorKind {
    UnknownOperation = 0,
    HandlerFailure = 1,
    SignatureMismatch = 2,
    InvalidArguments = 3,
    Overloaded = 4,
}

impl DispatchErrorKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::UnknownOperation),
            1 => Some(Self::HandlerFailure),
            2 => Some(Self::SignatureMismatch),
            3 => Some(Self::InvalidArguments),
            4 => Some(Self::Overloaded),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownOperation => "unknown operation",
            Self::HandlerFailure => "handler failure",
            Self::SignatureMismatch => "signature mismatch",
            Self::InvalidArguments => "invalid arguments",
            Self::Overloaded => "overloaded",
        };
        f.write_str(name)
    }
}

/// Structured per-call failure, carried in a Call-Response frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DispatchError {
    pub kind: DispatchErrorKind,
    pub message: String,
}

impl DispatchError {
    pub fn new(kind: DispatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(
            DispatchErrorKind::UnknownOperation,
            format!("operation `{}` is not served", name),
        )
    }

    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::HandlerFailure, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::InvalidArguments, message)
    }
}

impl From<String> for DispatchError {
    fn from(message: String) -> Self {
        DispatchError::handler_failure(message)
    }
}

impl From<&str> for DispatchError {
    fn from(message: &str) -> Self {
        DispatchError::handler_failure(message)
    }
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        DispatchError::invalid_arguments(err.to_string())
    }
}

/// Failure of the underlying byte stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Copy suitable for fanning out to every pending call.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            TransportError::Closed => TransportError::Closed,
            TransportError::Io(e) => TransportError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// Main error type for all pactwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// Handshake reported that the peer lacks operations this side requires.
    #[error("protocol mismatch: peer is missing {}", format_missing(.missing))]
    ProtocolMismatch { missing: Vec<OperationRef> },

    #[error("remote call failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("call to `{operation}` timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level violation (bad kind, oversized frame, out-of-order frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Call attempted for an operation the local contract does not declare.
    #[error("operation `{0}` is not declared in the local contract")]
    UnknownOperation(String),

    /// The call was cancelled before a response arrived.
    #[error("call cancelled")]
    Cancelled,

    #[error("backpressure timeout")]
    BackpressureTimeout,

    /// An outgoing frame would exceed the session's frame size limit.
    /// Only the affected call fails.
    #[error("frame of {size} bytes exceeds max frame size {max}")]
    FrameTooLarge { size: usize, max: u32 },
}

impl RpcError {
    /// Whether this error ends the session it was raised on.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::ProtocolMismatch { .. } | RpcError::Transport(_) | RpcError::Protocol(_)
        )
    }

    /// Copy for fanning a session-fatal error out to several waiters.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            RpcError::Codec(e) => RpcError::Codec(e.clone()),
            RpcError::Contract(e) => RpcError::Contract(e.clone()),
            RpcError::ProtocolMismatch { missing } => RpcError::ProtocolMismatch {
                missing: missing.clone(),
            },
            RpcError::Dispatch(e) => RpcError::Dispatch(e.clone()),
            RpcError::Timeout { operation, after } => RpcError::Timeout {
                operation: operation.clone(),
                after: *after,
            },
            RpcError::Transport(e) => RpcError::Transport(e.duplicate()),
            RpcError::Protocol(msg) => RpcError::Protocol(msg.clone()),
            RpcError::UnknownOperation(name) => RpcError::UnknownOperation(name.clone()),
            RpcError::Cancelled => RpcError::Cancelled,
            RpcError::BackpressureTimeout => RpcError::BackpressureTimeout,
            RpcError::FrameTooLarge { size, max } => RpcError::FrameTooLarge {
                size: *size,
                max: *max,
            },
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport(TransportError::Io(err))
    }
}

fn format_missing(missing: &[OperationRef]) -> String {
    let names: Vec<&str> = missing.iter().map(|op| op.name.as_str()).collect();
    format!("[{}]", names.join(", "))
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
