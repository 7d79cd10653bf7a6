//! Handshake messages and negotiation.
//!
//! The invoker opens every session with a [`HandshakeRequest`] naming the
//! operations it requires. The dispatcher answers with a
//! [`HandshakeResponse`] computed by [`negotiate`]. Calls may only flow after
//! a `Compatible` answer, so contract drift shows up as a precise list of
//! missing operations when the connection starts.
//!
//! # Body layout
//!
//! ```text
//! HandshakeRequest:  signature(32) | u32 count | (string name, signature(32))*
//! HandshakeResponse: u8 status     | [u32 count | (string name, signature(32))*]
//! ```

use std::collections::HashSet;

use bytes::{BufMut, BytesMut};

use super::wire_format::status;
use crate::codec::wire::{put_string, WireReader};
use crate::contract::{Contract, OperationRef, Signature};
use crate::error::{CodecError, Result, RpcError};

/// Opening message from the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Aggregate signature of the invoker's contract.
    pub contract_signature: Signature,
    /// Every operation the invoker may call.
    pub required: Vec<OperationRef>,
}

impl HandshakeRequest {
    /// Request requiring every operation of `contract`.
    pub fn for_contract(contract: &Contract) -> Self {
        Self {
            contract_signature: contract.signature(),
            required: contract.operation_refs(),
        }
    }

    pub fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_slice(self.contract_signature.as_bytes());
        put_operation_refs(buf, &self.required);
    }

    pub fn decode_body(reader: &mut WireReader<'_>) -> std::result::Result<Self, CodecError> {
        let contract_signature = Signature::from_bytes(reader.read_fixed()?);
        let required = read_operation_refs(reader)?;
        Ok(Self {
            contract_signature,
            required,
        })
    }
}

/// Dispatcher's verdict on a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResponse {
    Compatible,
    /// Required operations absent (by name and signature) on the dispatcher.
    Incompatible { missing: Vec<OperationRef> },
}

impl HandshakeResponse {
    #[inline]
    pub fn is_compatible(&self) -> bool {
        matches!(self, HandshakeResponse::Compatible)
    }

    /// Convert into a session result; `Incompatible` becomes `ProtocolMismatch`.
    pub fn into_result(self) -> Result<()> {
        match self {
            HandshakeResponse::Compatible => Ok(()),
            HandshakeResponse::Incompatible { missing } => {
                Err(RpcError::ProtocolMismatch { missing })
            }
        }
    }

    pub fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            HandshakeResponse::Compatible => buf.put_u8(status::COMPATIBLE),
            HandshakeResponse::Incompatible { missing } => {
                buf.put_u8(status::INCOMPATIBLE);
                put_operation_refs(buf, missing);
            }
        }
    }

    pub fn decode_body(reader: &mut WireReader<'_>) -> std::result::Result<Self, CodecError> {
        match reader.read_u8()? {
            status::COMPATIBLE => Ok(HandshakeResponse::Compatible),
            status::INCOMPATIBLE => Ok(HandshakeResponse::Incompatible {
                missing: read_operation_refs(reader)?,
            }),
            other => Err(CodecError::Malformed(format!(
                "unknown handshake status {}",
                other
            ))),
        }
    }
}

/// Compare a request against the locally served contract.
///
/// `missing` keeps the request's order and lists each operation once.
pub fn negotiate(contract: &Contract, request: &HandshakeRequest) -> HandshakeResponse {
    if request.contract_signature == contract.signature() {
        return HandshakeResponse::Compatible;
    }

    let mut seen = HashSet::new();
    let missing: Vec<OperationRef> = request
        .required
        .iter()
        .filter(|op| !contract.provides(op))
        .filter(|op| seen.insert((op.name.as_str(), op.signature)))
        .cloned()
        .collect();

    if missing.is_empty() {
        HandshakeResponse::Compatible
    } else {
        HandshakeResponse::Incompatible { missing }
    }
}

fn put_operation_refs(buf: &mut BytesMut, ops: &[OperationRef]) {
    buf.put_u32(ops.len() as u32);
    for op in ops {
        put_string(buf, &op.name);
        buf.put_slice(op.signature.as_bytes());
    }
}

fn read_operation_refs(
    reader: &mut WireReader<'_>,
) -> std::result::Result<Vec<OperationRef>, CodecError> {
    let count = reader.read_u32()? as usize;
    // Each entry takes at least a length prefix and a signature
    let mut ops = Vec::with_capacity(count.min(reader.remaining() / 36));
    for _ in 0..count {
        let name = reader.read_string()?;
        let signature = Signature::from_bytes(reader.read_fixed()?);
        ops.push(OperationRef { name, signature });
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::{CodecRegistry, TypeDescriptor};

    fn contract(ops: &[&str]) -> Contract {
        let mut contract = Contract::empty(Arc::new(CodecRegistry::with_primitives()));
        for name in ops {
            contract = contract
                .with_operation(*name, vec![TypeDescriptor::Int], TypeDescriptor::Int)
                .unwrap();
        }
        contract
    }

    #[test]
    fn test_identical_contracts_compatible() {
        let server = contract(&["a", "b"]);
        let request = HandshakeRequest::for_contract(&contract(&["b", "a"]));
        assert_eq!(negotiate(&server, &request), HandshakeResponse::Compatible);
    }

    #[test]
    fn test_subset_is_compatible() {
        let server = contract(&["a", "b", "c"]);
        let request = HandshakeRequest::for_contract(&contract(&["a", "c"]));
        assert!(negotiate(&server, &request).is_compatible());
    }

    #[test]
    fn test_missing_is_exact_set_difference() {
        let server = contract(&["A", "B"]);
        let client = contract(&["A", "B", "C"]);
        let response = negotiate(&server, &HandshakeRequest::for_contract(&client));
        assert_eq!(
            response,
            HandshakeResponse::Incompatible {
                missing: vec![client.operation("C").unwrap().to_ref()],
            }
        );
    }

    #[test]
    fn test_same_name_different_signature_is_missing() {
        let server = Contract::empty(Arc::new(CodecRegistry::with_primitives()))
            .with_operation("f", vec![TypeDescriptor::String], TypeDescriptor::Int)
            .unwrap();
        let client = contract(&["f"]);
        match negotiate(&server, &HandshakeRequest::for_contract(&client)) {
            HandshakeResponse::Incompatible { missing } => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].name, "f");
                assert_eq!(missing[0].signature, client.operation("f").unwrap().signature());
            }
            other => panic!("expected incompatible, got {:?}", other),
        }
    }

    #[test]
    fn test_into_result() {
        assert!(HandshakeResponse::Compatible.into_result().is_ok());
        let err = HandshakeResponse::Incompatible { missing: vec![] }
            .into_result()
            .unwrap_err();
        assert!(matches!(err, RpcError::ProtocolMismatch { .. }));
    }

    #[test]
    fn test_body_roundtrip() {
        let client = contract(&["x", "y"]);
        let request = HandshakeRequest::for_contract(&client);
        let mut buf = BytesMut::new();
        request.encode_body(&mut buf);
        assert_eq!(buf.len(), 32 + 4 + 2 * (4 + 1 + 32));
        let decoded = HandshakeRequest::decode_body(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(decoded, request);

        let response = HandshakeResponse::Incompatible {
            missing: request.required.clone(),
        };
        let mut buf = BytesMut::new();
        response.encode_body(&mut buf);
        assert_eq!(buf[0], status::INCOMPATIBLE);
        assert_eq!(
            HandshakeResponse::decode_body(&mut WireReader::new(&buf)).unwrap(),
            response
        );
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let err = HandshakeResponse::decode_body(&mut WireReader::new(&[9])).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
