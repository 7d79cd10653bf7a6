//! Dynamic values and typed conversions.
//!
//! Codecs move [`Value`]s. The [`Wire`] trait maps Rust types onto values and
//! descriptors so hand-written stubs can stay typed:
//!
//! ```
//! use pactwire::codec::{TypeDescriptor, Value, Wire};
//!
//! assert_eq!(<Vec<i64>>::descriptor(), TypeDescriptor::sequence(TypeDescriptor::Int));
//! let value = Some("hi".to_string()).into_value();
//! assert_eq!(Option::<String>::from_value(value).unwrap(), Some("hi".to_string()));
//! ```

use bytes::Bytes;

use super::TypeDescriptor;
use crate::error::CodecError;

/// A value in the codec system's data model.
///
/// Equality is bitwise for floats, so a decoded value equals the value that
/// was encoded: `NaN == NaN` with the same payload, and `0.0 != -0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    Optional(Option<Box<Value>>),
    Sequence(Vec<Value>),
    Tuple(Vec<Value>),
    Union { tag: u32, value: Box<Value> },
    /// Payload of a custom type; the registered codec owns its layout.
    Custom { name: String, bytes: Bytes },
}

impl Value {
    pub fn some(value: Value) -> Self {
        Value::Optional(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        Value::Optional(None)
    }

    pub fn union(tag: u32, value: Value) -> Self {
        Value::Union {
            tag,
            value: Box::new(value),
        }
    }

    /// Name of the value's shape, used in mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::UInt(_) => "UInt",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Optional(_) => "Optional",
            Value::Sequence(_) => "Sequence",
            Value::Tuple(_) => "Tuple",
            Value::Union { .. } => "Union",
            Value::Custom { .. } => "Custom",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (
                Value::Union { tag: ta, value: va },
                Value::Union { tag: tb, value: vb },
            ) => ta == tb && va == vb,
            (
                Value::Custom { name: na, bytes: ba },
                Value::Custom { name: nb, bytes: bb },
            ) => na == nb && ba == bb,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Conversion between a Rust type and the codec data model.
pub trait Wire: Sized {
    /// Descriptor of this type's wire layout.
    fn descriptor() -> TypeDescriptor;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, CodecError>;
}

fn mismatch<T: Wire>(found: &Value) -> CodecError {
    CodecError::mismatch(T::descriptor(), found.kind_name())
}

macro_rules! impl_wire_scalar {
    ($ty:ty, $desc:ident, $variant:ident) => {
        impl Wire for $ty {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::$desc
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    };
}

impl_wire_scalar!(bool, Bool, Bool);
impl_wire_scalar!(i64, Int, Int);
impl_wire_scalar!(u64, UInt, UInt);
impl_wire_scalar!(f64, Float, Float);
impl_wire_scalar!(String, String, String);
impl_wire_scalar!(Bytes, Bytes, Bytes);

impl Wire for i32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Int
    }

    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Int(v) => i32::try_from(v)
                .map_err(|_| CodecError::Malformed(format!("{} does not fit in i32", v))),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Wire for u32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::UInt
    }

    fn into_value(self) -> Value {
        Value::UInt(self as u64)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::UInt(v) => u32::try_from(v)
                .map_err(|_| CodecError::Malformed(format!("{} does not fit in u32", v))),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl Wire for () {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Unit
    }

    fn into_value(self) -> Value {
        Value::Unit
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Unit => Ok(()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Wire> Wire for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional(T::descriptor())
    }

    fn into_value(self) -> Value {
        Value::Optional(self.map(|v| Box::new(v.into_value())))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Optional(inner) => inner.map(|v| T::from_value(*v)).transpose(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::sequence(T::descriptor())
    }

    fn into_value(self) -> Value {
        Value::Sequence(self.into_iter().map(Wire::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Sequence(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

/// An ordered argument list, converted to and from `Vec<Value>`.
///
/// Implemented for tuples of [`Wire`] types up to arity 4.
pub trait WireArgs: Sized {
    fn descriptors() -> Vec<TypeDescriptor>;

    fn into_values(self) -> Vec<Value>;

    fn from_values(values: Vec<Value>) -> Result<Self, CodecError>;
}

impl WireArgs for () {
    fn descriptors() -> Vec<TypeDescriptor> {
        Vec::new()
    }

    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }

    fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(CodecError::mismatch("0 arguments", values.len()))
        }
    }
}

macro_rules! impl_wire_tuple {
    ($len:expr; $($name:ident),+) => {
        impl<$($name: Wire),+> WireArgs for ($($name,)+) {
            fn descriptors() -> Vec<TypeDescriptor> {
                vec![$($name::descriptor()),+]
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into_value()),+]
            }

            #[allow(non_snake_case)]
            fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
                if values.len() != $len {
                    return Err(CodecError::mismatch(
                        format!("{} arguments", $len),
                        values.len(),
                    ));
                }
                let mut iter = values.into_iter();
                $(
                    let $name = match iter.next() {
                        Some(v) => $name::from_value(v)?,
                        None => return Err(CodecError::Malformed("argument list ended early".into())),
                    };
                )+
                Ok(($($name,)+))
            }
        }

        impl<$($name: Wire),+> Wire for ($($name,)+) {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::Tuple(<Self as WireArgs>::descriptors())
            }

            fn into_value(self) -> Value {
                Value::Tuple(<Self as WireArgs>::into_values(self))
            }

            fn from_value(value: Value) -> Result<Self, CodecError> {
                match value {
                    Value::Tuple(items) => <Self as WireArgs>::from_values(items),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    };
}

impl_wire_tuple!(1; A);
impl_wire_tuple!(2; A, B);
impl_wire_tuple!(3; A, B, C);
impl_wire_tuple!(4; A, B, C, D);
