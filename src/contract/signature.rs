//! Structural fingerprints for operations and contracts.
//!
//! An operation's signature is SHA-256 over:
//!
//! ```text
//! "pactwire/operation/v1" | u32 len | name | u32 argc | canon(arg)* | canon(ret)
//! ```
//!
//! A contract's aggregate signature hashes the *sorted* list of operation
//! signatures, so declaration order never affects compatibility:
//!
//! ```text
//! "pactwire/contract/v1" | u32 count | sorted(op signature)*
//! ```

use std::fmt;

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};

use crate::codec::TypeDescriptor;

/// Signature length in bytes.
pub const SIGNATURE_LEN: usize = 32;

const OPERATION_DOMAIN: &[u8] = b"pactwire/operation/v1";
const CONTRACT_DOMAIN: &[u8] = b"pactwire/contract/v1";

/// Fixed-length fingerprint of an operation or a contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    #[inline]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Lowercase hex of the full signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

/// Compute the signature of an operation from its name and descriptors.
///
/// Custom types are hashed by name alone. Contracts use
/// [`signature_with_layouts`] so custom layouts count too.
pub fn signature_of(name: &str, args: &[TypeDescriptor], ret: &TypeDescriptor) -> Signature {
    signature_with_layouts(name, args, ret, &|_| None)
}

/// Compute the signature of an operation, folding in the wire layout that
/// `layout` reports for each custom type.
pub fn signature_with_layouts(
    name: &str,
    args: &[TypeDescriptor],
    ret: &TypeDescriptor,
    layout: &dyn Fn(&str) -> Option<String>,
) -> Signature {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(OPERATION_DOMAIN);
    buf.put_u32(name.len() as u32);
    buf.put_slice(name.as_bytes());
    buf.put_u32(args.len() as u32);
    for arg in args {
        arg.write_canonical_with(&mut buf, layout);
    }
    ret.write_canonical_with(&mut buf, layout);
    Signature(Sha256::digest(&buf).into())
}

/// Combine operation signatures into an order-independent contract signature.
pub fn aggregate_signature<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Signature {
    let mut sorted: Vec<&Signature> = signatures.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(CONTRACT_DOMAIN);
    hasher.update((sorted.len() as u32).to_be_bytes());
    for sig in sorted {
        hasher.update(sig.as_bytes());
    }
    Signature(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = signature_of("factorial", &[TypeDescriptor::Int], &TypeDescriptor::Int);
        let b = signature_of("factorial", &[TypeDescriptor::Int], &TypeDescriptor::Int);
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_sensitive_to_each_part() {
        let base = signature_of("f", &[TypeDescriptor::Int], &TypeDescriptor::Int);
        let renamed = signature_of("g", &[TypeDescriptor::Int], &TypeDescriptor::Int);
        let arg_changed = signature_of("f", &[TypeDescriptor::String], &TypeDescriptor::Int);
        let ret_changed = signature_of("f", &[TypeDescriptor::Int], &TypeDescriptor::UInt);
        let arity_changed = signature_of(
            "f",
            &[TypeDescriptor::Int, TypeDescriptor::Int],
            &TypeDescriptor::Int,
        );
        for other in [renamed, arg_changed, ret_changed, arity_changed] {
            assert_ne!(base, other);
        }
    }

    #[test]
    fn test_argument_boundaries_do_not_collide() {
        // (Tuple(Int, Int)) vs (Int, Int): same leaves, different shape
        let nested = signature_of(
            "f",
            &[TypeDescriptor::tuple([TypeDescriptor::Int, TypeDescriptor::Int])],
            &TypeDescriptor::Unit,
        );
        let flat = signature_of(
            "f",
            &[TypeDescriptor::Int, TypeDescriptor::Int],
            &TypeDescriptor::Unit,
        );
        assert_ne!(nested, flat);
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = signature_of("a", &[], &TypeDescriptor::Unit);
        let b = signature_of("b", &[], &TypeDescriptor::Unit);
        let c = signature_of("c", &[], &TypeDescriptor::Unit);
        assert_eq!(
            aggregate_signature([&a, &b, &c]),
            aggregate_signature([&c, &a, &b])
        );
        assert_ne!(aggregate_signature([&a, &b]), aggregate_signature([&a, &b, &c]));
    }

    #[test]
    fn test_display_and_debug() {
        let sig = Signature::from_bytes([0xAB; SIGNATURE_LEN]);
        assert_eq!(sig.to_string().len(), 64);
        assert_eq!(sig.short(), "abababababababab");
        assert_eq!(format!("{:?}", sig), "Signature(abababababababab)");
    }
}
