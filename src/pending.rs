//! Pending-call table shared by the invoker and its session task.
//!
//! Entries are inserted by callers and removed by exactly one of: the reader
//! (response arrived), the caller (timeout, cancel, drop) or teardown. The
//! lock is never held across an `.await`, and decoding happens outside it.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::codec::{Codec, Value};
use crate::error::{Result, RpcError};
use crate::protocol::{CallOutcome, CallResponse};

/// Completion slot for one outstanding call.
pub(crate) struct PendingCall {
    pub operation: String,
    pub return_codec: Codec,
    pub tx: oneshot::Sender<Result<Value>>,
    pub created: Instant,
}

#[derive(Default)]
struct Table {
    calls: HashMap<u64, PendingCall>,
    /// Set once by teardown; later inserts fail with a copy of it.
    closed: Option<RpcError>,
}

#[derive(Default)]
pub(crate) struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, unless the session is already closed.
    pub fn insert(&self, id: u64, call: PendingCall) -> Result<()> {
        let mut table = self.table.lock();
        if let Some(err) = &table.closed {
            return Err(err.duplicate());
        }
        table.calls.insert(id, call);
        Ok(())
    }

    pub fn remove(&self, id: u64) -> Option<PendingCall> {
        self.table.lock().calls.remove(&id)
    }

    /// Resolve the call a response belongs to.
    ///
    /// Responses for ids no longer in the table are discarded.
    pub fn complete(&self, response: CallResponse) {
        let id = response.correlation_id;
        let Some(call) = self.remove(id) else {
            tracing::debug!(correlation_id = id, "Discarding response for unknown call");
            return;
        };

        let result = match response.outcome {
            CallOutcome::Success(bytes) => call
                .return_codec
                .decode_exact(&bytes)
                .map_err(RpcError::Codec),
            CallOutcome::Failure(err) => Err(RpcError::Dispatch(err)),
        };

        tracing::debug!(
            correlation_id = id,
            operation = %call.operation,
            elapsed = ?call.created.elapsed(),
            ok = result.is_ok(),
            "Call completed"
        );

        // Receiver gone means the caller stopped waiting in the meantime
        let _ = call.tx.send(result);
    }

    /// Fail every pending call with `err` and refuse new ones.
    ///
    /// Only the first close takes effect.
    pub fn close(&self, err: RpcError) {
        let drained: Vec<(u64, PendingCall)> = {
            let mut table = self.table.lock();
            if table.closed.is_some() {
                return;
            }
            table.closed = Some(err.duplicate());
            table.calls.drain().collect()
        };

        if !drained.is_empty() {
            tracing::debug!(pending = drained.len(), error = %err, "Failing pending calls");
        }
        for (_, call) in drained {
            let _ = call.tx.send(Err(err.duplicate()));
        }
    }

    /// The teardown error, if the table is closed.
    pub fn closed_error(&self) -> Option<RpcError> {
        self.table.lock().closed.as_ref().map(RpcError::duplicate)
    }

    pub fn len(&self) -> usize {
        self.table.lock().calls.len()
    }
}
