//! Contract definition - the immutable set of operations a service exposes.
//!
//! A [`Contract`] is built once by pure accumulation and then shared through
//! an `Arc` by both the dispatcher and the invoker. Every descriptor an
//! operation mentions is resolved against the [`CodecRegistry`] while the
//! contract is built, so a missing codec surfaces as
//! [`ContractError::MissingCodec`] at startup rather than mid-call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pactwire::codec::{CodecRegistry, TypeDescriptor};
//! use pactwire::contract::Contract;
//!
//! let registry = Arc::new(CodecRegistry::with_primitives());
//! let contract = Contract::empty(registry)
//!     .with_operation("factorial", vec![TypeDescriptor::Int], TypeDescriptor::Int)
//!     .unwrap()
//!     .with_typed_operation::<(String,), u64>("length")
//!     .unwrap();
//!
//! assert_eq!(contract.len(), 2);
//! assert!(contract.operation("factorial").is_some());
//! ```

mod manifest;
mod signature;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{Codec, CodecRegistry, TypeDescriptor, Wire, WireArgs};
use crate::error::ContractError;

pub use manifest::{build_manifest_json, ContractManifest, OperationManifest};
pub use signature::{
    aggregate_signature, signature_of, signature_with_layouts, Signature, SIGNATURE_LEN,
};

/// Name plus signature; the unit compared during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationRef {
    pub name: String,
    pub signature: Signature,
}

impl OperationRef {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

impl fmt::Display for OperationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.signature.short())
    }
}

/// A named operation with resolved codecs.
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    args: Vec<TypeDescriptor>,
    ret: TypeDescriptor,
    signature: Signature,
    /// Tuple codec over all arguments.
    args_codec: Codec,
    ret_codec: Codec,
}

impl Operation {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.args
    }

    #[inline]
    pub fn returns(&self) -> &TypeDescriptor {
        &self.ret
    }

    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Codec for the argument list, encoded as one tuple.
    #[inline]
    pub fn args_codec(&self) -> &Codec {
        &self.args_codec
    }

    #[inline]
    pub fn return_codec(&self) -> &Codec {
        &self.ret_codec
    }

    pub fn to_ref(&self) -> OperationRef {
        OperationRef::new(self.name.clone(), self.signature)
    }
}

/// Immutable, ordered collection of operations plus their aggregate signature.
///
/// `Contract` is `Send + Sync`; share it with `Arc<Contract>`.
#[derive(Debug, Clone)]
pub struct Contract {
    registry: Arc<CodecRegistry>,
    operations: Vec<Operation>,
    by_name: HashMap<String, usize>,
    signature: Signature,
}

impl Contract {
    /// A contract with no operations, resolving codecs from `registry`.
    pub fn empty(registry: Arc<CodecRegistry>) -> Self {
        Self {
            registry,
            operations: Vec::new(),
            by_name: HashMap::new(),
            signature: aggregate_signature(std::iter::empty()),
        }
    }

    /// Return a new contract with one more operation.
    ///
    /// `self` is left untouched.
    ///
    /// # Errors
    ///
    /// - `DuplicateOperation` if `name` is already declared
    /// - `MissingCodec` if any descriptor cannot be resolved
    pub fn with_operation(
        &self,
        name: impl Into<String>,
        args: Vec<TypeDescriptor>,
        ret: TypeDescriptor,
    ) -> Result<Contract, ContractError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ContractError::DuplicateOperation(name));
        }

        let resolve = |descriptor: &TypeDescriptor| {
            self.registry
                .resolve(descriptor)
                .map_err(|_| ContractError::MissingCodec {
                    operation: name.clone(),
                    descriptor: descriptor.clone(),
                })
        };
        let arg_codecs = args.iter().map(resolve).collect::<Result<Vec<_>, _>>()?;
        let ret_codec = resolve(&ret)?;
        let layout = |custom: &str| {
            self.registry
                .lookup(&TypeDescriptor::custom(custom))
                .ok()
                .and_then(Codec::layout)
        };

        let operation = Operation {
            signature: signature_with_layouts(&name, &args, &ret, &layout),
            args_codec: Codec::tuple(arg_codecs),
            ret_codec,
            name: name.clone(),
            args,
            ret,
        };

        let mut next = self.clone();
        next.by_name.insert(name, next.operations.len());
        next.operations.push(operation);
        next.signature = aggregate_signature(next.operations.iter().map(|op| &op.signature));
        Ok(next)
    }

    /// Typed variant of [`with_operation`](Self::with_operation).
    pub fn with_typed_operation<A: WireArgs, R: Wire>(
        &self,
        name: impl Into<String>,
    ) -> Result<Contract, ContractError> {
        self.with_operation(name, A::descriptors(), R::descriptor())
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.by_name.get(name).map(|&i| &self.operations[i])
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Name + signature of every operation, in declaration order.
    pub fn operation_refs(&self) -> Vec<OperationRef> {
        self.operations.iter().map(Operation::to_ref).collect()
    }

    /// Whether an operation with exactly this name and signature exists.
    pub fn provides(&self, op: &OperationRef) -> bool {
        self.operation(&op.name)
            .map(|local| local.signature == op.signature)
            .unwrap_or(false)
    }

    /// Aggregate signature over all operations.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
