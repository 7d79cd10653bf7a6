//! Invoker: the calling side of a session.
//!
//! The [`InvokerBuilder`] configures timeouts and limits; `connect` then runs
//! the handshake over the given stream. The resulting [`Invoker`] manages the
//! session lifecycle:
//! 1. Send the handshake request and wait for a compatible answer
//! 2. Spawn the writer task and one session task
//! 3. Correlate every response to its pending call by id
//! 4. Fail all pending calls when the session ends, whether the read side
//!    closes or a write fails
//!
//! One invoker multiplexes any number of concurrent calls; share it with an
//! `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pactwire::codec::CodecRegistry;
//! use pactwire::contract::Contract;
//! use pactwire::Invoker;
//!
//! # async fn run(stream: tokio::net::UnixStream) -> pactwire::Result<()> {
//! let contract = Arc::new(
//!     Contract::empty(Arc::new(CodecRegistry::with_primitives()))
//!         .with_typed_operation::<(i64,), i64>("factorial")?,
//! );
//!
//! let invoker = Invoker::builder(contract)
//!     .call_timeout(Duration::from_secs(5))
//!     .connect(stream)
//!     .await?;
//!
//! let n: i64 = invoker.call_typed("factorial", (5i64,)).await?;
//! assert_eq!(n, 120);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};

use crate::codec::{Value, Wire, WireArgs};
use crate::config::SessionConfig;
use crate::contract::Contract;
use crate::error::{Result, RpcError, TransportError};
use crate::pending::{PendingCall, PendingCalls};
use crate::protocol::{CallRequest, Frame, HandshakeRequest};
use crate::reader::FrameReader;
use crate::session::Session;
use crate::writer::{exit_error, spawn_writer_task, WriterHandle};

/// Builder for configuring and connecting an [`Invoker`].
pub struct InvokerBuilder {
    contract: Arc<Contract>,
    config: SessionConfig,
}

impl InvokerBuilder {
    pub fn new(contract: Arc<Contract>) -> Self {
        Self {
            contract,
            config: SessionConfig::default(),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Deadline for calls without an explicit timeout.
    ///
    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config = self.config.max_frame_size(size);
        self
    }

    /// Perform the handshake over `io` and start the session.
    ///
    /// # Errors
    ///
    /// - `ProtocolMismatch` if the peer lacks required operations
    /// - `Timeout` if the peer did not answer within `handshake_timeout`
    /// - `Protocol` if the peer answered with anything but a handshake response
    /// - `Transport` if the stream failed or closed first
    pub async fn connect<S>(self, io: S) -> Result<Invoker>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Invoker::connect(self.contract, self.config, io).await
    }
}

/// A connected, handshaken calling session.
pub struct Invoker {
    contract: Arc<Contract>,
    call_timeout: Duration,
    writer: WriterHandle,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    session_task: JoinHandle<()>,
    writer_task: AbortHandle,
}

impl Invoker {
    pub fn builder(contract: Arc<Contract>) -> InvokerBuilder {
        InvokerBuilder::new(contract)
    }

    async fn connect<S>(contract: Arc<Contract>, config: SessionConfig, io: S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (writer, writer_task) = spawn_writer_task(write_half, &config);
        let mut reader = FrameReader::new(read_half, &config);
        let mut session = Session::new("invoker");

        if let Err(e) = Self::handshake(&contract, &config, &mut reader, &writer, &mut session).await
        {
            session.close();
            writer_task.abort();
            return Err(e);
        }

        let pending = Arc::new(PendingCalls::new());
        let writer_abort = writer_task.abort_handle();
        let session_task = tokio::spawn(session_loop(reader, writer_task, session, pending.clone()));

        Ok(Self {
            contract,
            call_timeout: config.call_timeout,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            session_task,
            writer_task: writer_abort,
        })
    }

    async fn handshake<R>(
        contract: &Contract,
        config: &SessionConfig,
        reader: &mut FrameReader<R>,
        writer: &WriterHandle,
        session: &mut Session,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let request = HandshakeRequest::for_contract(contract);
        writer.send_frame(&Frame::HandshakeRequest(request)).await?;

        let timeout = config.handshake_timeout;
        let frame = match tokio::time::timeout(timeout, reader.next()).await {
            Ok(frame) => frame?,
            Err(_) => {
                return Err(RpcError::Timeout {
                    operation: "handshake".to_string(),
                    after: timeout,
                })
            }
        };

        match frame {
            Some(Frame::HandshakeResponse(response)) => {
                response.into_result()?;
                tracing::debug!(contract = %contract.signature().short(), "Handshake accepted");
                session.start_serving()
            }
            Some(other) => {
                session.state().check_frame(other.kind())?;
                Err(RpcError::Protocol(format!(
                    "expected handshake response, got {:?}",
                    other.kind()
                )))
            }
            None => Err(RpcError::Transport(TransportError::Closed)),
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    /// Call `operation` with the default timeout.
    ///
    /// # Errors
    ///
    /// - `UnknownOperation` if the local contract does not declare it
    /// - `Codec` if the arguments or the returned value do not match
    /// - `Dispatch` if the peer reported a failure
    /// - `Timeout` if no response arrived in time
    /// - `Transport`/`Protocol` if the session ended first
    pub async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Value> {
        self.start_call(operation, args).await?.wait().await
    }

    pub async fn call_with_timeout(
        &self,
        operation: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.start_call_with_timeout(operation, args, timeout)
            .await?
            .wait()
            .await
    }

    /// Call with typed arguments and result.
    pub async fn call_typed<A: WireArgs, R: Wire>(&self, operation: &str, args: A) -> Result<R> {
        let value = self.call(operation, args.into_values()).await?;
        Ok(R::from_value(value)?)
    }

    /// Send a call and return a handle to its pending response.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`call`](Self::call), `FrameTooLarge` if the
    /// encoded call exceeds `max_frame_size`. Nothing is sent in that case
    /// and the session stays open.
    pub async fn start_call(&self, operation: &str, args: Vec<Value>) -> Result<PendingResponse> {
        self.start_call_with_timeout(operation, args, self.call_timeout)
            .await
    }

    pub async fn start_call_with_timeout(
        &self,
        operation: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        let op = self
            .contract
            .operation(operation)
            .ok_or_else(|| RpcError::UnknownOperation(operation.to_string()))?;

        let encoded = op.args_codec().encode(&Value::Tuple(args))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = self.writer.encode(&Frame::CallRequest(CallRequest {
            correlation_id: id,
            operation: operation.to_string(),
            signature: op.signature(),
            args: encoded,
        }))?;

        let (tx, rx) = oneshot::channel();
        let deadline = tokio::time::Instant::now() + timeout;

        self.pending.insert(
            id,
            PendingCall {
                operation: operation.to_string(),
                return_codec: op.return_codec().clone(),
                tx,
                created: Instant::now(),
            },
        )?;

        // From here on the handle owns the entry; dropping it removes it
        let handle = PendingResponse {
            id,
            operation: operation.to_string(),
            timeout,
            deadline,
            rx,
            pending: self.pending.clone(),
        };

        if let Err(e) = self.writer.send(frame).await {
            return Err(self.pending.closed_error().unwrap_or(e));
        }

        Ok(handle)
    }

    /// Abandon a pending call by id; its waiter resolves with `Cancelled`.
    ///
    /// Returns whether the call was still pending. The peer is not notified.
    pub fn cancel(&self, id: u64) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Whether the session has ended.
    pub fn is_closed(&self) -> bool {
        self.pending.closed_error().is_some()
    }

    /// End the session; pending and later calls fail with `Transport(Closed)`.
    pub fn close(&self) {
        self.pending
            .close(RpcError::Transport(TransportError::Closed));
        self.session_task.abort();
        self.writer_task.abort();
    }
}

impl Drop for Invoker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("contract", &self.contract.signature())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

/// Handle to one outstanding call.
///
/// Dropping the handle cancels the call locally.
pub struct PendingResponse {
    id: u64,
    operation: String,
    timeout: Duration,
    deadline: tokio::time::Instant,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Arc<PendingCalls>,
}

impl PendingResponse {
    /// Correlation id of the call.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop waiting for the response. The peer is not notified.
    pub fn cancel(self) {
        drop(self);
    }

    /// Wait for the response, the deadline or session teardown.
    pub async fn wait(mut self) -> Result<Value> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            // Entry removed without a response
            Ok(Err(_)) => Err(self.pending.closed_error().unwrap_or(RpcError::Cancelled)),
            Err(_) => {
                self.pending.remove(self.id);
                tracing::debug!(correlation_id = self.id, operation = %self.operation, "Call timed out");
                Err(RpcError::Timeout {
                    operation: self.operation.clone(),
                    after: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .finish()
    }
}

/// Demultiplex responses until the session ends, then fail what is left.
///
/// The session ends when the peer closes, a frame is invalid or the writer
/// task stops on a failed write.
async fn session_loop<R>(
    mut reader: FrameReader<R>,
    mut writer_task: JoinHandle<Result<()>>,
    mut session: Session,
    pending: Arc<PendingCalls>,
) where
    R: AsyncRead + Unpin,
{
    let err = loop {
        let next = tokio::select! {
            next = reader.next() => next,
            joined = &mut writer_task => break exit_error(joined),
        };
        match next {
            Ok(Some(Frame::CallResponse(response))) => pending.complete(response),
            Ok(Some(other)) => {
                break RpcError::Protocol(format!(
                    "unexpected {:?} frame while serving",
                    other.kind()
                ))
            }
            Ok(None) => break RpcError::Transport(TransportError::Closed),
            Err(e) => break e,
        }
    };

    match &err {
        RpcError::Transport(TransportError::Closed) => tracing::debug!("Peer closed the session"),
        other => tracing::error!(error = %other, "Session failed"),
    }
    session.close();
    pending.close(err);
}
