//! Dedicated writer task for frame sending.
//!
//! Every session owns exactly one writer task fed by an mpsc channel. Handlers
//! and callers never touch the write half directly, so frames are never
//! interleaved and several ready frames go out in a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Caller  2 ─┼─► WriterHandle::encode ─► mpsc ─► Writer Task ─► Stream
//! Handler N ─┘   (size limit)
//! ```
//!
//! Frames over the session's `max_frame_size` are refused by
//! [`WriterHandle::encode`] with [`RpcError::FrameTooLarge`] before they reach
//! the queue, so an oversized result or argument list fails one call instead
//! of tripping the peer's frame guard.
//!
//! Queued frames are counted; senders wait (up to `backpressure_timeout`)
//! while the count is at `max_pending_frames`.

use std::io::{self, IoSlice};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::error::{Result, RpcError, TransportError};
use crate::protocol::{encode_length, Frame, LENGTH_PREFIX_SIZE};

/// Default maximum queued frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames drained into a single vectored write.
const MAX_BATCH_SIZE: usize = 64;

const BACKPRESSURE_POLL: Duration = Duration::from_micros(100);

/// A length-checked frame ready to be written to the stream.
///
/// Cloning shares the payload.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    prefix: [u8; LENGTH_PREFIX_SIZE],
    /// Kind byte plus body; never empty.
    payload: Bytes,
}

impl OutboundFrame {
    /// Wrap an encoded payload (kind byte plus body).
    ///
    /// # Errors
    ///
    /// `FrameTooLarge` if the payload is longer than `max_frame_size`.
    pub fn new(payload: Bytes, max_frame_size: u32) -> Result<Self> {
        let size = payload.len();
        let len = u32::try_from(size)
            .ok()
            .filter(|len| *len <= max_frame_size)
            .ok_or(RpcError::FrameTooLarge {
                size,
                max: max_frame_size,
            })?;
        Ok(Self {
            prefix: encode_length(len),
            payload,
        })
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
///
/// Deserializable as part of [`SessionConfig`]; the timeout is given in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    /// Maximum queued frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(rename = "backpressure_timeout_ms", with = "crate::config::millis")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable and shared across handler tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    /// Frames accepted but not yet written.
    queued: Arc<AtomicUsize>,
    max_pending: usize,
    backpressure_timeout: Duration,
    max_frame_size: u32,
}

impl WriterHandle {
    /// Encode a frame and check it against the session's frame size limit.
    pub fn encode(&self, frame: &Frame) -> Result<OutboundFrame> {
        OutboundFrame::new(frame.encode_payload(), self.max_frame_size)
    }

    /// Queue a frame for writing.
    ///
    /// # Errors
    ///
    /// - `BackpressureTimeout` if the queue did not drain in time
    /// - `Transport(Closed)` if the writer task has exited
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.wait_for_capacity().await?;

        // Counted before sending so the writer never decrements below zero
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.queued.fetch_sub(1, Ordering::Release);
            RpcError::Transport(TransportError::Closed)
        })
    }

    /// Encode, check and queue a typed frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.send(self.encode(frame)?).await
    }

    async fn wait_for_capacity(&self) -> Result<()> {
        let deadline = Instant::now() + self.backpressure_timeout;
        while self.queued.load(Ordering::Acquire) >= self.max_pending {
            if self.tx.is_closed() {
                return Err(RpcError::Transport(TransportError::Closed));
            }
            if Instant::now() >= deadline {
                return Err(RpcError::BackpressureTimeout);
            }
            tokio::time::sleep(BACKPRESSURE_POLL).await;
        }
        Ok(())
    }
}

/// Spawn the writer task for one session.
///
/// The task ends with `Ok(())` once every [`WriterHandle`] is dropped, and
/// with the I/O error of the first failed write otherwise.
pub fn spawn_writer_task<W>(
    writer: W,
    config: &SessionConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.writer.channel_capacity.max(1));
    let queued = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        queued: queued.clone(),
        max_pending: config.writer.max_pending_frames.max(1),
        backpressure_timeout: config.writer.backpressure_timeout,
        max_frame_size: config.max_frame_size,
    };

    let task = tokio::spawn(writer_loop(rx, writer, queued));

    (handle, task)
}

/// Error to fail dependents with once the writer task has ended.
pub(crate) fn exit_error(joined: std::result::Result<Result<()>, JoinError>) -> RpcError {
    match joined {
        Ok(Err(e)) => e,
        _ => RpcError::Transport(TransportError::Closed),
    }
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    queued: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!(error = %e, frames = batch.len(), "Frame write failed, stopping writer");
            return Err(e);
        }

        queued.fetch_sub(batch.len(), Ordering::Release);
        batch.clear();
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Write every frame of `batch` with vectored writes, resuming after
/// partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "stream accepted no bytes").into());
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// Slices covering `batch` past its first `skip` bytes.
fn remaining_slices(batch: &[OutboundFrame], skip: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for part in batch
        .iter()
        .flat_map(|frame| [&frame.prefix[..], &frame.payload[..]])
    {
        let end = offset + part.len();
        if skip < end {
            slices.push(IoSlice::new(&part[skip.saturating_sub(offset)..]));
        }
        offset = end;
    }

    slices
}
