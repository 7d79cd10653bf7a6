//! Dispatcher: the serving side of a session.
//!
//! The [`DispatcherBuilder`] provides a fluent API for attaching handlers to
//! the operations of a contract. The resulting [`Dispatcher`] serves any
//! number of connections, one [`Dispatcher::serve`] future each:
//! 1. Read the peer's handshake and answer it
//! 2. On a compatible handshake, read call frames continuously
//! 3. Run each call's handler in its own task
//! 4. Send every response through the session's writer task
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pactwire::codec::CodecRegistry;
//! use pactwire::contract::Contract;
//! use pactwire::Dispatcher;
//!
//! let contract = Arc::new(
//!     Contract::empty(Arc::new(CodecRegistry::with_primitives()))
//!         .with_typed_operation::<(i64,), i64>("square")
//!         .unwrap(),
//! );
//!
//! let dispatcher = Dispatcher::builder(contract)
//!     .handle_sync("square", |(n,): (i64,)| Ok(n * n))
//!     .build()
//!     .unwrap();
//! # let _ = dispatcher;
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::{Codec, Value, Wire, WireArgs};
use crate::config::SessionConfig;
use crate::contract::Contract;
use crate::error::{ContractError, DispatchError, DispatchErrorKind, Result, RpcError};
use crate::handler::{
    CallContext, Handler, HandlerRegistry, RawHandler, SyncHandler, TypedHandler,
};
use crate::protocol::{negotiate, CallOutcome, CallRequest, CallResponse, Frame};
use crate::reader::FrameReader;
use crate::session::Session;
use crate::writer::{exit_error, spawn_writer_task, OutboundFrame, WriterHandle};

/// Builder for configuring and creating a [`Dispatcher`].
pub struct DispatcherBuilder {
    contract: Arc<Contract>,
    handlers: HandlerRegistry,
    config: SessionConfig,
}

impl DispatcherBuilder {
    pub fn new(contract: Arc<Contract>) -> Self {
        Self {
            contract,
            handlers: HandlerRegistry::new(),
            config: SessionConfig::default(),
        }
    }

    /// Register an async handler with typed arguments and result.
    pub fn handle<F, A, R, Fut>(mut self, operation: &str, handler: F) -> Self
    where
        F: Fn(A, CallContext) -> Fut + Send + Sync + 'static,
        A: WireArgs + Send + 'static,
        R: Wire + Send + 'static,
        Fut: Future<Output = std::result::Result<R, DispatchError>> + Send + 'static,
    {
        self.handlers
            .register(operation, TypedHandler::new(handler));
        self
    }

    /// Register a synchronous handler with typed arguments and result.
    pub fn handle_sync<F, A, R>(mut self, operation: &str, handler: F) -> Self
    where
        F: Fn(A) -> std::result::Result<R, DispatchError> + Send + Sync + 'static,
        A: WireArgs + 'static,
        R: Wire + 'static,
    {
        self.handlers.register(operation, SyncHandler::new(handler));
        self
    }

    /// Register a handler working on raw [`Value`]s.
    pub fn handle_raw<F, Fut>(mut self, operation: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, DispatchError>> + Send + 'static,
    {
        self.handlers.register(operation, RawHandler::new(handler));
        self
    }

    /// Register any [`Handler`] implementation.
    pub fn handler(mut self, operation: &str, handler: impl Handler) -> Self {
        self.handlers.register(operation, handler);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of concurrent handlers per session.
    ///
    /// When this limit is reached, new calls are answered with an
    /// `Overloaded` error.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Build the dispatcher.
    ///
    /// Declared operations without a handler are allowed; calls to them are
    /// answered with `UnknownOperation`.
    ///
    /// # Errors
    ///
    /// `UndeclaredOperation` if a handler is registered for a name the
    /// contract does not declare.
    pub fn build(self) -> std::result::Result<Dispatcher, ContractError> {
        let mut undeclared: Vec<&str> = self
            .handlers
            .names()
            .filter(|name| self.contract.operation(name).is_none())
            .collect();
        undeclared.sort_unstable();
        if let Some(name) = undeclared.first() {
            return Err(ContractError::UndeclaredOperation(name.to_string()));
        }

        for op in self.contract.operations() {
            if !self.handlers.contains(op.name()) {
                tracing::debug!(operation = op.name(), "Declared operation has no handler");
            }
        }

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                contract: self.contract,
                handlers: self.handlers,
                config: self.config,
            }),
        })
    }
}

struct Inner {
    contract: Arc<Contract>,
    handlers: HandlerRegistry,
    config: SessionConfig,
}

/// Serves a contract over any number of connections.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// A validated call ready to run.
struct PreparedCall {
    handler: Arc<dyn Handler>,
    args: Vec<Value>,
    return_codec: Codec,
}

impl Dispatcher {
    pub fn builder(contract: Arc<Contract>) -> DispatcherBuilder {
        DispatcherBuilder::new(contract)
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.inner.contract
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Run one session over `io` until it closes.
    ///
    /// Returns `Ok(())` when the peer closes the stream. Per-call failures
    /// are reported to the peer and never end the session.
    ///
    /// # Errors
    ///
    /// - `ProtocolMismatch` if the peer required operations this side lacks
    /// - `Timeout` if no handshake arrived within `handshake_timeout`
    /// - `Protocol` on a framing violation or an out-of-order frame
    /// - `Transport` on I/O failure, including a failed response write
    /// - `BackpressureTimeout` if a response could not be queued twice in a row
    pub async fn serve<S>(&self, io: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let config = &self.inner.config;
        let (read_half, write_half) = tokio::io::split(io);
        let (writer, mut writer_task) = spawn_writer_task(write_half, config);
        let mut reader = FrameReader::new(read_half, config);
        let mut session = Session::new("dispatcher");

        let result = match self.handshake(&mut reader, &writer, &mut session).await {
            Ok(true) => {
                self.serve_calls(&mut reader, &writer, &mut writer_task)
                    .await
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        session.close();

        drop(writer);
        match result {
            Err(e) if !matches!(e, RpcError::ProtocolMismatch { .. }) => {
                tracing::warn!(error = %e, "Session closed");
                writer_task.abort();
                Err(e)
            }
            // Let in-flight handlers finish and flush their responses
            graceful => {
                let _ = writer_task.await;
                graceful
            }
        }
    }

    /// Returns `false` if the peer closed before sending a handshake.
    async fn handshake<R>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &WriterHandle,
        session: &mut Session,
    ) -> Result<bool>
    where
        R: AsyncRead + Unpin,
    {
        let timeout = self.inner.config.handshake_timeout;
        let frame = match tokio::time::timeout(timeout, reader.next()).await {
            Ok(frame) => frame?,
            Err(_) => {
                return Err(RpcError::Timeout {
                    operation: "handshake".to_string(),
                    after: timeout,
                })
            }
        };

        let request = match frame {
            Some(Frame::HandshakeRequest(request)) => request,
            Some(other) => {
                session.state().check_frame(other.kind())?;
                return Err(RpcError::Protocol(format!(
                    "expected handshake request, got {:?}",
                    other.kind()
                )));
            }
            None => return Ok(false),
        };

        let response = negotiate(&self.inner.contract, &request);
        writer
            .send_frame(&Frame::HandshakeResponse(response.clone()))
            .await?;

        if response.is_compatible() {
            tracing::debug!(required = request.required.len(), "Handshake accepted");
            session.start_serving()?;
            Ok(true)
        } else {
            tracing::warn!(response = ?response, "Handshake rejected");
            response.into_result().map(|()| false)
        }
    }

    /// Read and dispatch calls until the peer closes, a frame is invalid, a
    /// response cannot be delivered or the writer task stops.
    async fn serve_calls<R>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &WriterHandle,
        writer_task: &mut JoinHandle<Result<()>>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let limit = self
            .inner
            .config
            .max_concurrent_handlers
            .min(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(limit));
        let (failures, mut failed) = mpsc::channel(1);

        loop {
            let frame = tokio::select! {
                frame = reader.next() => frame?,
                joined = &mut *writer_task => return Err(exit_error(joined)),
                Some(err) = failed.recv() => return Err(err),
            };

            match frame {
                Some(Frame::CallRequest(request)) => {
                    self.dispatch_call(request, writer, &semaphore, &failures)
                        .await?
                }
                Some(other) => {
                    return Err(RpcError::Protocol(format!(
                        "unexpected {:?} frame while serving",
                        other.kind()
                    )))
                }
                None => return Ok(()),
            }
        }
    }

    /// Validate a call and spawn its handler, or answer with the failure.
    ///
    /// A response the handler task fails to deliver is reported on `failures`
    /// and ends the session.
    async fn dispatch_call(
        &self,
        request: CallRequest,
        writer: &WriterHandle,
        semaphore: &Arc<Semaphore>,
        failures: &mpsc::Sender<RpcError>,
    ) -> Result<()> {
        let id = request.correlation_id;

        let prepared = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(err) => return reply(writer, CallResponse::failure(id, err)).await,
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    correlation_id = id,
                    operation = %request.operation,
                    "Handler capacity reached, rejecting call"
                );
                let err = DispatchError::new(
                    DispatchErrorKind::Overloaded,
                    "handler capacity reached",
                );
                return reply(writer, CallResponse::failure(id, err)).await;
            }
        };

        let ctx = CallContext::new(id, request.operation, request.signature);
        let writer = writer.clone();
        let failures = failures.clone();

        tokio::spawn(async move {
            // Permit is held until the response is queued
            let _permit = permit;
            let operation = ctx.operation().to_string();

            let outcome = run_handler(prepared, ctx).await;
            if let CallOutcome::Failure(err) = &outcome {
                tracing::warn!(correlation_id = id, operation = %operation, error = %err, "Call failed");
            }

            let response = CallResponse {
                correlation_id: id,
                outcome,
            };
            if let Err(e) = reply(&writer, response).await {
                tracing::error!(correlation_id = id, error = %e, "Response not delivered");
                let _ = failures.try_send(e);
            }
        });

        Ok(())
    }

    fn prepare(&self, request: &CallRequest) -> std::result::Result<PreparedCall, DispatchError> {
        let operation = self
            .inner
            .contract
            .operation(&request.operation)
            .ok_or_else(|| DispatchError::unknown_operation(&request.operation))?;

        let handler = self
            .inner
            .handlers
            .get(&request.operation)
            .ok_or_else(|| DispatchError::unknown_operation(&request.operation))?;

        if operation.signature() != request.signature {
            return Err(DispatchError::new(
                DispatchErrorKind::SignatureMismatch,
                format!(
                    "operation `{}` has signature {}, caller expected {}",
                    request.operation,
                    operation.signature().short(),
                    request.signature.short()
                ),
            ));
        }

        let args = match operation.args_codec().decode_exact(&request.args)? {
            Value::Tuple(args) => args,
            other => {
                return Err(DispatchError::invalid_arguments(format!(
                    "expected argument tuple, decoded {}",
                    other.kind_name()
                )))
            }
        };

        Ok(PreparedCall {
            handler: handler.clone(),
            args,
            return_codec: operation.return_codec().clone(),
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("contract", &self.inner.contract.signature())
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

/// Queue a response, retrying once if the writer stays backed up.
///
/// An error here means the peer will never see this response, so callers
/// end the session rather than leave the peer waiting for its deadline.
async fn reply(writer: &WriterHandle, response: CallResponse) -> Result<()> {
    let id = response.correlation_id;
    let frame = encode_response(writer, response)?;

    match writer.send(frame.clone()).await {
        Err(RpcError::BackpressureTimeout) => {
            tracing::warn!(correlation_id = id, "Writer backed up, retrying response");
            writer.send(frame).await
        }
        other => other,
    }
}

/// Encode a response for the wire. A result too large for one frame is
/// replaced by a `HandlerFailure` so only its own call fails.
fn encode_response(writer: &WriterHandle, response: CallResponse) -> Result<OutboundFrame> {
    let id = response.correlation_id;
    match writer.encode(&Frame::CallResponse(response)) {
        Err(RpcError::FrameTooLarge { size, max }) => {
            tracing::warn!(correlation_id = id, size, max, "Response exceeds max frame size");
            let err = DispatchError::handler_failure(format!(
                "result exceeds max frame size ({} > {} bytes)",
                size, max
            ));
            writer.encode(&Frame::CallResponse(CallResponse::failure(id, err)))
        }
        other => other,
    }
}

/// Run the handler in its own task so a panic is caught by its `JoinError`.
async fn run_handler(call: PreparedCall, ctx: CallContext) -> CallOutcome {
    let PreparedCall {
        handler,
        args,
        return_codec,
    } = call;

    let joined = tokio::spawn(async move { handler.call(args, ctx).await }).await;

    let value = match joined {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => return CallOutcome::Failure(err),
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            return CallOutcome::Failure(DispatchError::handler_failure(format!(
                "handler panicked: {}",
                message
            )));
        }
        Err(_) => {
            return CallOutcome::Failure(DispatchError::handler_failure("handler was cancelled"))
        }
    };

    match return_codec.encode(&value) {
        Ok(bytes) => CallOutcome::Success(bytes),
        Err(e) => CallOutcome::Failure(DispatchError::handler_failure(format!(
            "return value does not match {}: {}",
            return_codec.descriptor(),
            e
        ))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
