//! Structural type descriptors.
//!
//! A [`TypeDescriptor`] names a wire layout. Two descriptors compare equal
//! exactly when their layouts are bit-compatible, which is what lets the
//! signature hasher fingerprint a contract from its shape alone.
//!
//! # Canonical form
//!
//! ```text
//! Unit=0x00 Bool=0x01 Int=0x02 UInt=0x03 Float=0x04 String=0x05 Bytes=0x06
//! Optional=0x10 <inner>
//! Sequence=0x11 <inner>
//! Tuple=0x12    <u32 count> <element>*
//! Union=0x13    <u32 count> (<u32 tag> <branch>)*   ascending by tag
//! Custom=0x20   <u32 len> <utf-8 name>
//! ```

use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, BytesMut};

/// Identifier for a type as seen by the codec system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Unit,
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    UInt,
    /// IEEE-754 double.
    Float,
    String,
    Bytes,
    Optional(Box<TypeDescriptor>),
    Sequence(Box<TypeDescriptor>),
    Tuple(Vec<TypeDescriptor>),
    /// Tagged union; branches are kept sorted by discriminant.
    Union(BTreeMap<u32, TypeDescriptor>),
    /// Application-defined leaf type, backed only by explicit registration.
    Custom(String),
}

mod tag {
    pub const UNIT: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const INT: u8 = 0x02;
    pub const UINT: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const STRING: u8 = 0x05;
    pub const BYTES: u8 = 0x06;
    pub const OPTIONAL: u8 = 0x10;
    pub const SEQUENCE: u8 = 0x11;
    pub const TUPLE: u8 = 0x12;
    pub const UNION: u8 = 0x13;
    pub const CUSTOM: u8 = 0x20;
}

impl TypeDescriptor {
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    pub fn sequence(element: TypeDescriptor) -> Self {
        TypeDescriptor::Sequence(Box::new(element))
    }

    pub fn tuple(elements: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        TypeDescriptor::Tuple(elements.into_iter().collect())
    }

    /// Build a union descriptor. Later duplicates of a tag replace earlier ones;
    /// use [`crate::codec::Codec::union`] for a checked construction.
    pub fn union(branches: impl IntoIterator<Item = (u32, TypeDescriptor)>) -> Self {
        TypeDescriptor::Union(branches.into_iter().collect())
    }

    pub fn custom(name: impl Into<String>) -> Self {
        TypeDescriptor::Custom(name.into())
    }

    /// Whether this descriptor is a primitive leaf.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Unit
                | TypeDescriptor::Bool
                | TypeDescriptor::Int
                | TypeDescriptor::UInt
                | TypeDescriptor::Float
                | TypeDescriptor::String
                | TypeDescriptor::Bytes
        )
    }

    /// Short name of the descriptor's outermost shape.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Unit => "Unit",
            TypeDescriptor::Bool => "Bool",
            TypeDescriptor::Int => "Int",
            TypeDescriptor::UInt => "UInt",
            TypeDescriptor::Float => "Float",
            TypeDescriptor::String => "String",
            TypeDescriptor::Bytes => "Bytes",
            TypeDescriptor::Optional(_) => "Optional",
            TypeDescriptor::Sequence(_) => "Sequence",
            TypeDescriptor::Tuple(_) => "Tuple",
            TypeDescriptor::Union(_) => "Union",
            TypeDescriptor::Custom(_) => "Custom",
        }
    }

    /// Canonical byte form used for hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(16);
        self.write_canonical(&mut buf);
        buf.to_vec()
    }

    /// Append the canonical byte form to `buf`.
    ///
    /// Custom types contribute their name and an empty layout.
    pub fn write_canonical(&self, buf: &mut BytesMut) {
        self.write_canonical_with(buf, &|_| None);
    }

    /// Append the canonical byte form to `buf`, asking `layout` for the wire
    /// layout of each custom type by name.
    pub fn write_canonical_with(
        &self,
        buf: &mut BytesMut,
        layout: &dyn Fn(&str) -> Option<String>,
    ) {
        match self {
            TypeDescriptor::Unit => buf.put_u8(tag::UNIT),
            TypeDescriptor::Bool => buf.put_u8(tag::BOOL),
            TypeDescriptor::Int => buf.put_u8(tag::INT),
            TypeDescriptor::UInt => buf.put_u8(tag::UINT),
            TypeDescriptor::Float => buf.put_u8(tag::FLOAT),
            TypeDescriptor::String => buf.put_u8(tag::STRING),
            TypeDescriptor::Bytes => buf.put_u8(tag::BYTES),
            TypeDescriptor::Optional(inner) => {
                buf.put_u8(tag::OPTIONAL);
                inner.write_canonical_with(buf, layout);
            }
            TypeDescriptor::Sequence(inner) => {
                buf.put_u8(tag::SEQUENCE);
                inner.write_canonical_with(buf, layout);
            }
            TypeDescriptor::Tuple(elements) => {
                buf.put_u8(tag::TUPLE);
                buf.put_u32(elements.len() as u32);
                for element in elements {
                    element.write_canonical_with(buf, layout);
                }
            }
            TypeDescriptor::Union(branches) => {
                buf.put_u8(tag::UNION);
                buf.put_u32(branches.len() as u32);
                // BTreeMap iterates in ascending tag order
                for (discriminant, branch) in branches {
                    buf.put_u32(*discriminant);
                    branch.write_canonical_with(buf, layout);
                }
            }
            TypeDescriptor::Custom(name) => {
                buf.put_u8(tag::CUSTOM);
                buf.put_u32(name.len() as u32);
                buf.put_slice(name.as_bytes());
                let layout = layout(name).unwrap_or_default();
                buf.put_u32(layout.len() as u32);
                buf.put_slice(layout.as_bytes());
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Optional(inner) => write!(f, "Optional<{}>", inner),
            TypeDescriptor::Sequence(inner) => write!(f, "Sequence<{}>", inner),
            TypeDescriptor::Tuple(elements) => {
                f.write_str("(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str(")")
            }
            TypeDescriptor::Union(branches) => {
                f.write_str("Union{")?;
                for (i, (discriminant, branch)) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", discriminant, branch)?;
                }
                f.write_str("}")
            }
            TypeDescriptor::Custom(name) => write!(f, "Custom<{}>", name),
            primitive => f.write_str(primitive.kind_name()),
        }
    }
}
