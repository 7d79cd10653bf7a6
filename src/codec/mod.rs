//! Codec module - the binary value algebra.
//!
//! - [`TypeDescriptor`] - structural identity of a wire layout
//! - [`Value`] - dynamic data model moved by codecs
//! - [`Codec`] - encode/decode pair, with combinators for composites
//! - [`CodecRegistry`] - explicit descriptor → codec map
//! - [`Wire`] / [`WireArgs`] - typed conversions for hand-written stubs
//!
//! # Errors
//!
//! Decoding distinguishes a short read ([`CodecError::InsufficientData`],
//! recoverable by buffering more input) from bad data
//! ([`CodecError::Malformed`], [`CodecError::UnknownDiscriminant`]).
//!
//! [`CodecError::InsufficientData`]: crate::error::CodecError::InsufficientData
//! [`CodecError::Malformed`]: crate::error::CodecError::Malformed
//! [`CodecError::UnknownDiscriminant`]: crate::error::CodecError::UnknownDiscriminant

mod combinators;
mod descriptor;
mod primitive;
mod registry;
mod value;
pub mod wire;

pub use combinators::{
    Codec, CustomCodec, FixedWidth, MAX_SEQUENCE_LEN, MAX_ZERO_WIDTH_SEQUENCE_LEN,
};
pub use descriptor::TypeDescriptor;
pub use registry::CodecRegistry;
pub use value::{Value, Wire, WireArgs};
pub use wire::WireReader;
