//! The [`Codec`] type and its combinators.
//!
//! A codec is a descriptor plus the encode/decode logic for it. Composite
//! codecs are assembled from simpler ones:
//!
//! - [`Codec::optional`] - presence flag, then the value
//! - [`Codec::sequence`] - `u32` count, then each element
//! - [`Codec::tuple`] - elements concatenated in order
//! - [`Codec::union`] - `u32` discriminant, then the chosen branch
//!
//! # Example
//!
//! ```
//! use pactwire::codec::{Codec, Value};
//!
//! let codec = Codec::sequence(Codec::optional(Codec::int()));
//! let value = Value::Sequence(vec![Value::some(Value::Int(3)), Value::none()]);
//!
//! let bytes = codec.encode(&value).unwrap();
//! assert_eq!(codec.decode_exact(&bytes).unwrap(), value);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::wire::WireReader;
use super::{primitive, TypeDescriptor, Value};
use crate::error::{CodecError, ContractError};

/// Upper bound on a decoded sequence's element count.
pub const MAX_SEQUENCE_LEN: u32 = 1 << 24;

/// Upper bound on the element count of a sequence whose elements can encode
/// to zero bytes, such as `Sequence<Unit>`.
pub const MAX_ZERO_WIDTH_SEQUENCE_LEN: u32 = 1 << 12;

/// Encode/decode logic for an application-defined [`TypeDescriptor::Custom`] type.
///
/// The codec sees the raw bytes of a [`Value::Custom`] and owns their wire layout.
pub trait CustomCodec: Send + Sync + 'static {
    fn encode(&self, bytes: &[u8], buf: &mut BytesMut) -> Result<(), CodecError>;

    fn decode(&self, reader: &mut WireReader<'_>) -> Result<Bytes, CodecError>;

    /// Stable description of the wire layout, e.g. `fixed:16`.
    ///
    /// Folded into operation signatures, so two peers agree on a custom
    /// type only if they agree on its name and its layout.
    fn layout(&self) -> String;

    /// Fewest bytes any encoding occupies.
    fn min_width(&self) -> usize {
        0
    }
}

/// Custom codec for fixed-width opaque values (ids, digests).
///
/// Written without a length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidth(pub usize);

impl CustomCodec for FixedWidth {
    fn encode(&self, bytes: &[u8], buf: &mut BytesMut) -> Result<(), CodecError> {
        if bytes.len() != self.0 {
            return Err(CodecError::mismatch(
                format!("{} bytes", self.0),
                format!("{} bytes", bytes.len()),
            ));
        }
        buf.put_slice(bytes);
        Ok(())
    }

    fn decode(&self, reader: &mut WireReader<'_>) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(reader.take(self.0)?))
    }

    fn layout(&self) -> String {
        format!("fixed:{}", self.0)
    }

    fn min_width(&self) -> usize {
        self.0
    }
}

#[derive(Clone)]
enum Repr {
    Primitive,
    Optional(Box<Codec>),
    Sequence(Box<Codec>),
    Tuple(Vec<Codec>),
    Union(BTreeMap<u32, Codec>),
    Custom(Arc<dyn CustomCodec>),
}

/// Encode/decode pair for one [`TypeDescriptor`].
///
/// Cheap to clone; custom codecs are shared behind an `Arc`.
#[derive(Clone)]
pub struct Codec {
    descriptor: TypeDescriptor,
    repr: Repr,
}

impl Codec {
    fn leaf(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            repr: Repr::Primitive,
        }
    }

    pub fn unit() -> Self {
        Self::leaf(TypeDescriptor::Unit)
    }

    pub fn bool() -> Self {
        Self::leaf(TypeDescriptor::Bool)
    }

    pub fn int() -> Self {
        Self::leaf(TypeDescriptor::Int)
    }

    pub fn uint() -> Self {
        Self::leaf(TypeDescriptor::UInt)
    }

    pub fn float() -> Self {
        Self::leaf(TypeDescriptor::Float)
    }

    pub fn string() -> Self {
        Self::leaf(TypeDescriptor::String)
    }

    pub fn bytes() -> Self {
        Self::leaf(TypeDescriptor::Bytes)
    }

    /// Built-in codec for a primitive descriptor, `None` for anything else.
    pub fn primitive(descriptor: &TypeDescriptor) -> Option<Self> {
        descriptor
            .is_primitive()
            .then(|| Self::leaf(descriptor.clone()))
    }

    /// All built-in primitive codecs.
    pub fn primitives() -> [Codec; 7] {
        [
            Self::unit(),
            Self::bool(),
            Self::int(),
            Self::uint(),
            Self::float(),
            Self::string(),
            Self::bytes(),
        ]
    }

    pub fn optional(inner: Codec) -> Self {
        Self {
            descriptor: TypeDescriptor::optional(inner.descriptor.clone()),
            repr: Repr::Optional(Box::new(inner)),
        }
    }

    pub fn sequence(element: Codec) -> Self {
        Self {
            descriptor: TypeDescriptor::sequence(element.descriptor.clone()),
            repr: Repr::Sequence(Box::new(element)),
        }
    }

    pub fn tuple(elements: impl IntoIterator<Item = Codec>) -> Self {
        let elements: Vec<Codec> = elements.into_iter().collect();
        Self {
            descriptor: TypeDescriptor::tuple(elements.iter().map(|c| c.descriptor.clone())),
            repr: Repr::Tuple(elements),
        }
    }

    /// Build a tagged union.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateDiscriminant` if a tag appears more than once.
    pub fn union(
        branches: impl IntoIterator<Item = (u32, Codec)>,
    ) -> Result<Self, ContractError> {
        let mut map = BTreeMap::new();
        for (tag, codec) in branches {
            if map.insert(tag, codec).is_some() {
                return Err(ContractError::DuplicateDiscriminant(tag));
            }
        }
        Ok(Self {
            descriptor: TypeDescriptor::Union(
                map.iter()
                    .map(|(tag, c)| (*tag, c.descriptor.clone()))
                    .collect(),
            ),
            repr: Repr::Union(map),
        })
    }

    /// Codec for an application-defined type named `name`.
    pub fn custom(name: impl Into<String>, codec: impl CustomCodec) -> Self {
        Self {
            descriptor: TypeDescriptor::custom(name),
            repr: Repr::Custom(Arc::new(codec)),
        }
    }

    /// Descriptor this codec implements.
    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Wire layout of a custom codec, `None` for every other kind.
    pub fn layout(&self) -> Option<String> {
        match &self.repr {
            Repr::Custom(codec) => Some(codec.layout()),
            _ => None,
        }
    }

    /// Fewest bytes any value of this codec encodes to.
    pub fn min_width(&self) -> usize {
        match &self.repr {
            Repr::Primitive => primitive::min_width(&self.descriptor),
            Repr::Optional(_) => 1,
            Repr::Sequence(_) => 4,
            Repr::Tuple(elements) => elements.iter().map(Codec::min_width).sum(),
            Repr::Union(branches) => {
                4 + branches.values().map(Codec::min_width).min().unwrap_or(0)
            }
            Repr::Custom(codec) => codec.min_width(),
        }
    }

    /// Reject element counts the codec would never produce or the input
    /// cannot hold.
    fn check_sequence_len(
        element: &Codec,
        count: usize,
        reader: Option<&WireReader<'_>>,
    ) -> Result<(), CodecError> {
        let width = element.min_width();
        let limit = if width == 0 {
            MAX_ZERO_WIDTH_SEQUENCE_LEN
        } else {
            MAX_SEQUENCE_LEN
        };
        if count > limit as usize {
            return Err(CodecError::Malformed(format!(
                "sequence length {} exceeds maximum {}",
                count, limit
            )));
        }
        if let Some(reader) = reader {
            let needed = count.saturating_mul(width);
            if needed > reader.remaining() {
                return Err(CodecError::InsufficientData {
                    needed: reader.position().saturating_add(needed),
                    available: reader.position() + reader.remaining(),
                });
            }
        }
        Ok(())
    }

    /// Structural identity: same descriptor, same combinator tree, and the
    /// very same custom codec instances at the leaves.
    pub fn same_structure(&self, other: &Codec) -> bool {
        if self.descriptor != other.descriptor {
            return false;
        }
        match (&self.repr, &other.repr) {
            (Repr::Primitive, Repr::Primitive) => true,
            (Repr::Optional(a), Repr::Optional(b)) | (Repr::Sequence(a), Repr::Sequence(b)) => {
                a.same_structure(b)
            }
            (Repr::Tuple(a), Repr::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_structure(y))
            }
            (Repr::Union(a), Repr::Union(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ta, ca), (tb, cb))| ta == tb && ca.same_structure(cb))
            }
            (Repr::Custom(a), Repr::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Encode a value into a fresh buffer.
    pub fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoding of `value` to `buf`.
    ///
    /// On error `buf` may hold a partial encoding.
    pub fn encode_into(&self, value: &Value, buf: &mut BytesMut) -> Result<(), CodecError> {
        match (&self.repr, value) {
            (Repr::Primitive, value) => primitive::encode(&self.descriptor, value, buf),
            (Repr::Optional(inner), Value::Optional(opt)) => match opt {
                Some(v) => {
                    buf.put_u8(1);
                    inner.encode_into(v, buf)
                }
                None => {
                    buf.put_u8(0);
                    Ok(())
                }
            },
            (Repr::Sequence(element), Value::Sequence(items)) => {
                Self::check_sequence_len(element, items.len(), None)?;
                buf.put_u32(items.len() as u32);
                items.iter().try_for_each(|item| element.encode_into(item, buf))
            }
            (Repr::Tuple(elements), Value::Tuple(items)) => {
                if elements.len() != items.len() {
                    return Err(CodecError::mismatch(
                        &self.descriptor,
                        format!("Tuple of {}", items.len()),
                    ));
                }
                elements
                    .iter()
                    .zip(items)
                    .try_for_each(|(codec, item)| codec.encode_into(item, buf))
            }
            (Repr::Union(branches), Value::Union { tag, value }) => {
                let branch = branches
                    .get(tag)
                    .ok_or(CodecError::UnknownDiscriminant(*tag))?;
                buf.put_u32(*tag);
                branch.encode_into(value, buf)
            }
            (Repr::Custom(codec), Value::Custom { name, bytes }) => match &self.descriptor {
                TypeDescriptor::Custom(expected) if expected == name => codec.encode(bytes, buf),
                _ => Err(CodecError::mismatch(&self.descriptor, format!("Custom<{}>", name))),
            },
            (_, value) => Err(CodecError::mismatch(&self.descriptor, value.kind_name())),
        }
    }

    /// Decode one value from the front of `input`.
    ///
    /// Returns the value and the number of bytes consumed. `input` is never
    /// modified, so on `InsufficientData` the caller can retry with a longer
    /// slice starting at the same offset.
    pub fn decode(&self, input: &[u8]) -> Result<(Value, usize), CodecError> {
        let mut reader = WireReader::new(input);
        let value = self.decode_from(&mut reader)?;
        Ok((value, reader.position()))
    }

    /// Decode a value that must span all of `input`.
    pub fn decode_exact(&self, input: &[u8]) -> Result<Value, CodecError> {
        let mut reader = WireReader::new(input);
        let value = self.decode_from(&mut reader)?;
        reader.expect_end()?;
        Ok(value)
    }

    /// Decode one value from a reader, advancing it.
    pub fn decode_from(&self, reader: &mut WireReader<'_>) -> Result<Value, CodecError> {
        match &self.repr {
            Repr::Primitive => primitive::decode(&self.descriptor, reader),
            Repr::Optional(inner) => {
                if reader.read_flag()? {
                    Ok(Value::some(inner.decode_from(reader)?))
                } else {
                    Ok(Value::none())
                }
            }
            Repr::Sequence(element) => {
                let count = reader.read_u32()? as usize;
                Self::check_sequence_len(element, count, Some(&*reader))?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(element.decode_from(reader)?);
                }
                Ok(Value::Sequence(items))
            }
            Repr::Tuple(elements) => elements
                .iter()
                .map(|codec| codec.decode_from(reader))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple),
            Repr::Union(branches) => {
                let tag = reader.read_u32()?;
                let branch = branches
                    .get(&tag)
                    .ok_or(CodecError::UnknownDiscriminant(tag))?;
                Ok(Value::union(tag, branch.decode_from(reader)?))
            }
            Repr::Custom(codec) => {
                let name = match &self.descriptor {
                    TypeDescriptor::Custom(name) => name.clone(),
                    other => other.to_string(),
                };
                Ok(Value::Custom {
                    name,
                    bytes: codec.decode(reader)?,
                })
            }
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Codec").field(&self.descriptor.to_string()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(codec: &Codec, value: Value) {
        let bytes = codec.encode(&value).unwrap();
        let (decoded, consumed) = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_optional_layout() {
        let codec = Codec::optional(Codec::bool());
        assert_eq!(&codec.encode(&Value::none()).unwrap()[..], &[0]);
        assert_eq!(
            &codec.encode(&Value::some(Value::Bool(true))).unwrap()[..],
            &[1, 1]
        );
        assert_roundtrip(&codec, Value::some(Value::Bool(false)));
    }

    #[test]
    fn test_sequence_layout() {
        let codec = Codec::sequence(Codec::uint());
        let bytes = codec
            .encode(&Value::Sequence(vec![Value::UInt(1), Value::UInt(2)]))
            .unwrap();
        assert_eq!(&bytes[..4], &2u32.to_be_bytes());
        assert_eq!(bytes.len(), 4 + 16);
        assert_roundtrip(&codec, Value::Sequence(vec![]));
    }

    #[test]
    fn test_tuple_is_plain_concatenation() {
        let codec = Codec::tuple([Codec::bool(), Codec::string()]);
        let bytes = codec
            .encode(&Value::Tuple(vec![
                Value::Bool(true),
                Value::String("ok".into()),
            ]))
            .unwrap();
        assert_eq!(&bytes[..], &[1, 0, 0, 0, 2, b'o', b'k']);
        assert_eq!(codec.descriptor().to_string(), "(Bool, String)");
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let codec = Codec::tuple([Codec::int(), Codec::int()]);
        let err = codec
            .encode(&Value::Tuple(vec![Value::Int(1)]))
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_union_roundtrip_and_unknown_tag() {
        let codec = Codec::union([(0, Codec::int()), (7, Codec::string())]).unwrap();
        assert_roundtrip(&codec, Value::union(7, Value::String("seven".into())));

        let mut corrupt = codec.encode(&Value::union(0, Value::Int(1))).unwrap().to_vec();
        corrupt[3] = 9;
        assert_eq!(
            codec.decode(&corrupt).unwrap_err(),
            CodecError::UnknownDiscriminant(9)
        );

        assert_eq!(
            codec.encode(&Value::union(3, Value::Int(1))).unwrap_err(),
            CodecError::UnknownDiscriminant(3)
        );
    }

    #[test]
    fn test_union_duplicate_tag_rejected() {
        let err = Codec::union([(1, Codec::int()), (1, Codec::string())]).unwrap_err();
        assert_eq!(err, ContractError::DuplicateDiscriminant(1));
    }

    #[test]
    fn test_decode_consumes_only_its_value() {
        let codec = Codec::int();
        let mut bytes = codec.encode(&Value::Int(5)).unwrap().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (value, consumed) = codec.decode(&bytes).unwrap();
        assert_eq!(value, Value::Int(5));
        assert_eq!(consumed, 8);
        assert!(matches!(
            codec.decode_exact(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_truncated_sequence_is_recoverable() {
        let codec = Codec::sequence(Codec::string());
        let bytes = codec
            .encode(&Value::Sequence(vec![
                Value::String("alpha".into()),
                Value::String("beta".into()),
            ]))
            .unwrap();
        for len in 0..bytes.len() {
            let err = codec.decode(&bytes[..len]).unwrap_err();
            assert!(err.is_recoverable(), "prefix {} gave {:?}", len, err);
        }
    }

    #[test]
    fn test_oversized_sequence_count_is_malformed() {
        let codec = Codec::sequence(Codec::unit());
        let bytes = (MAX_SEQUENCE_LEN + 1).to_be_bytes();
        assert!(matches!(
            codec.decode(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_zero_width_sequence_count_is_capped() {
        let codec = Codec::sequence(Codec::unit());
        assert!(matches!(
            codec.decode(&[0x00, 0xFF, 0xFF, 0xFF]),
            Err(CodecError::Malformed(_))
        ));

        let at_cap = MAX_ZERO_WIDTH_SEQUENCE_LEN.to_be_bytes();
        let (value, consumed) = codec.decode(&at_cap).unwrap();
        assert_eq!(consumed, 4);
        assert!(matches!(value, Value::Sequence(items) if items.len() == MAX_ZERO_WIDTH_SEQUENCE_LEN as usize));

        let too_many = Value::Sequence(vec![Value::Unit; MAX_ZERO_WIDTH_SEQUENCE_LEN as usize + 1]);
        assert!(matches!(codec.encode(&too_many), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_sequence_count_beyond_input_is_insufficient() {
        let codec = Codec::sequence(Codec::int());
        let mut bytes = 1000u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(
            codec.decode(&bytes).unwrap_err(),
            CodecError::InsufficientData {
                needed: 4 + 8000,
                available: 20,
            }
        );
    }

    #[test]
    fn test_min_width() {
        assert_eq!(Codec::unit().min_width(), 0);
        assert_eq!(Codec::tuple([Codec::int(), Codec::bool()]).min_width(), 9);
        assert_eq!(Codec::optional(Codec::int()).min_width(), 1);
        let union = Codec::union([(0, Codec::unit()), (1, Codec::int())]).unwrap();
        assert_eq!(union.min_width(), 4);
        assert_eq!(Codec::custom("Uuid", FixedWidth(16)).min_width(), 16);
    }

    #[test]
    fn test_custom_layout() {
        assert_eq!(
            Codec::custom("Uuid", FixedWidth(16)).layout().as_deref(),
            Some("fixed:16")
        );
        assert_eq!(Codec::int().layout(), None);
    }

    #[test]
    fn test_fixed_width_custom() {
        let codec = Codec::custom("Uuid", FixedWidth(16));
        let value = Value::Custom {
            name: "Uuid".into(),
            bytes: Bytes::from(vec![7u8; 16]),
        };
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_roundtrip(&codec, value);

        let wrong_name = Value::Custom {
            name: "Other".into(),
            bytes: Bytes::from(vec![7u8; 16]),
        };
        assert!(codec.encode(&wrong_name).is_err());
    }

    #[test]
    fn test_same_structure() {
        assert!(Codec::optional(Codec::int()).same_structure(&Codec::optional(Codec::int())));
        assert!(!Codec::optional(Codec::int()).same_structure(&Codec::sequence(Codec::int())));

        let a = Codec::custom("Id", FixedWidth(4));
        let b = Codec::custom("Id", FixedWidth(4));
        assert!(a.same_structure(&a.clone()));
        assert!(!a.same_structure(&b));
    }

    #[test]
    fn test_primitive_lookup() {
        assert!(Codec::primitive(&TypeDescriptor::String).is_some());
        assert!(Codec::primitive(&TypeDescriptor::sequence(TypeDescriptor::Int)).is_none());
    }
}
