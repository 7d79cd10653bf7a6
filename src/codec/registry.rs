//! Codec registry keyed by type descriptor.
//!
//! The registry is an explicit value: build one at startup, wrap it in an
//! `Arc`, and hand it to [`Contract::empty`](crate::contract::Contract::empty).
//! There is no process-wide registry.
//!
//! # Example
//!
//! ```
//! use pactwire::codec::{Codec, CodecRegistry, FixedWidth, TypeDescriptor};
//!
//! let mut registry = CodecRegistry::with_primitives();
//! registry.register(Codec::custom("Uuid", FixedWidth(16))).unwrap();
//!
//! // Composite descriptors resolve from their registered leaves.
//! let desc = TypeDescriptor::sequence(TypeDescriptor::custom("Uuid"));
//! assert!(registry.resolve(&desc).is_ok());
//! assert!(registry.lookup(&desc).is_err());
//! ```

use std::collections::HashMap;

use super::{Codec, TypeDescriptor};
use crate::error::ContractError;

/// Registry mapping descriptors to codecs.
#[derive(Debug, Default, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<TypeDescriptor, Codec>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in primitive codec registered.
    pub fn with_primitives() -> Self {
        let mut registry = Self::new();
        for codec in Codec::primitives() {
            registry
                .codecs
                .insert(codec.descriptor().clone(), codec);
        }
        registry
    }

    /// Register a codec under its own descriptor.
    ///
    /// Registering a structurally identical codec again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCodec` if a different codec already owns the descriptor.
    pub fn register(&mut self, codec: Codec) -> Result<(), ContractError> {
        if let Some(existing) = self.codecs.get(codec.descriptor()) {
            if existing.same_structure(&codec) {
                return Ok(());
            }
            return Err(ContractError::DuplicateCodec(codec.descriptor().clone()));
        }
        tracing::debug!(descriptor = %codec.descriptor(), "registered codec");
        self.codecs.insert(codec.descriptor().clone(), codec);
        Ok(())
    }

    /// Fetch the codec registered for exactly this descriptor.
    pub fn lookup(&self, descriptor: &TypeDescriptor) -> Result<&Codec, ContractError> {
        self.codecs
            .get(descriptor)
            .ok_or_else(|| ContractError::CodecNotFound(descriptor.clone()))
    }

    /// Fetch or assemble a codec for `descriptor`.
    ///
    /// An exact registration wins. Otherwise composite descriptors are built
    /// with the combinators from codecs resolved for their children.
    ///
    /// # Errors
    ///
    /// Returns `CodecNotFound` naming the first leaf without a codec.
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> Result<Codec, ContractError> {
        if let Some(codec) = self.codecs.get(descriptor) {
            return Ok(codec.clone());
        }
        match descriptor {
            TypeDescriptor::Optional(inner) => Ok(Codec::optional(self.resolve(inner)?)),
            TypeDescriptor::Sequence(inner) => Ok(Codec::sequence(self.resolve(inner)?)),
            TypeDescriptor::Tuple(elements) => elements
                .iter()
                .map(|e| self.resolve(e))
                .collect::<Result<Vec<_>, _>>()
                .map(Codec::tuple),
            TypeDescriptor::Union(branches) => {
                let resolved = branches
                    .iter()
                    .map(|(tag, d)| self.resolve(d).map(|c| (*tag, c)))
                    .collect::<Result<Vec<_>, _>>()?;
                Codec::union(resolved)
            }
            leaf => Err(ContractError::CodecNotFound(leaf.clone())),
        }
    }

    /// Check whether `descriptor` can be resolved.
    pub fn can_resolve(&self, descriptor: &TypeDescriptor) -> bool {
        self.resolve(descriptor).is_ok()
    }

    /// Number of exact registrations.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
