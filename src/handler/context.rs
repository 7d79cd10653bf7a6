//! Call context for handlers.

use std::time::{Duration, Instant};

use crate::contract::Signature;

/// Context passed to every handler invocation.
///
/// `CallContext` is `Clone` and can be moved into spawned tasks.
#[derive(Debug, Clone)]
pub struct CallContext {
    correlation_id: u64,
    operation: String,
    signature: Signature,
    received_at: Instant,
}

impl CallContext {
    pub fn new(correlation_id: u64, operation: impl Into<String>, signature: Signature) -> Self {
        Self {
            correlation_id,
            operation: operation.into(),
            signature,
            received_at: Instant::now(),
        }
    }

    /// Id the response will carry.
    #[inline]
    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    #[inline]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Time since the request frame was decoded.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }
}
