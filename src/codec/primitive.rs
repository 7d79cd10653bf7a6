//! Primitive leaf layouts.
//!
//! | Descriptor | Layout                        |
//! |------------|-------------------------------|
//! | Unit       | nothing                       |
//! | Bool       | 1 byte, 0 or 1                |
//! | Int        | i64 BE                        |
//! | UInt       | u64 BE                        |
//! | Float      | IEEE-754 bits as u64 BE       |
//! | String     | u32 BE length + UTF-8         |
//! | Bytes      | u32 BE length + raw bytes     |

use bytes::{BufMut, Bytes, BytesMut};

use super::wire::{put_blob, put_string, WireReader};
use super::{TypeDescriptor, Value};
use crate::error::CodecError;

pub(crate) fn encode(
    descriptor: &TypeDescriptor,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    match (descriptor, value) {
        (TypeDescriptor::Unit, Value::Unit) => {}
        (TypeDescriptor::Bool, Value::Bool(b)) => buf.put_u8(u8::from(*b)),
        (TypeDescriptor::Int, Value::Int(n)) => buf.put_i64(*n),
        (TypeDescriptor::UInt, Value::UInt(n)) => buf.put_u64(*n),
        (TypeDescriptor::Float, Value::Float(x)) => buf.put_u64(x.to_bits()),
        (TypeDescriptor::String, Value::String(s)) => put_string(buf, s),
        (TypeDescriptor::Bytes, Value::Bytes(b)) => put_blob(buf, b),
        (descriptor, value) => {
            return Err(CodecError::mismatch(descriptor, value.kind_name()));
        }
    }
    Ok(())
}

pub(crate) fn decode(
    descriptor: &TypeDescriptor,
    reader: &mut WireReader<'_>,
) -> Result<Value, CodecError> {
    let value = match descriptor {
        TypeDescriptor::Unit => Value::Unit,
        TypeDescriptor::Bool => Value::Bool(reader.read_flag()?),
        TypeDescriptor::Int => Value::Int(reader.read_i64()?),
        TypeDescriptor::UInt => Value::UInt(reader.read_u64()?),
        TypeDescriptor::Float => Value::Float(reader.read_f64()?),
        TypeDescriptor::String => Value::String(reader.read_string()?),
        TypeDescriptor::Bytes => Value::Bytes(Bytes::copy_from_slice(reader.read_blob()?)),
        other => {
            return Err(CodecError::Malformed(format!(
                "{} is not a primitive",
                other
            )))
        }
    };
    Ok(value)
}

/// Encoded size of the smallest value of a primitive.
pub(crate) fn min_width(descriptor: &TypeDescriptor) -> usize {
    match descriptor {
        TypeDescriptor::Bool => 1,
        TypeDescriptor::Int | TypeDescriptor::UInt | TypeDescriptor::Float => 8,
        TypeDescriptor::String | TypeDescriptor::Bytes => 4,
        _ => 0,
    }
}
