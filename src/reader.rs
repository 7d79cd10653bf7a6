//! Frame reader over the read half of a stream.
//!
//! Wraps a [`FrameBuffer`] with a reusable read buffer. Frames decoded from
//! one read are queued and handed out one at a time, so `next` can be used in
//! `select!`/timeout without losing data.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::protocol::{Frame, FrameBuffer};

pub struct FrameReader<R> {
    reader: R,
    frames: FrameBuffer,
    buf: Vec<u8>,
    queued: VecDeque<Frame>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, config: &SessionConfig) -> Self {
        Self {
            reader,
            frames: FrameBuffer::with_max_frame(config.max_frame_size),
            buf: vec![0u8; config.read_buffer_size.max(1)],
            queued: VecDeque::new(),
        }
    }

    /// Next complete frame, or `None` once the peer has closed the stream.
    ///
    /// Cancel safe: a frame is only removed from the queue when returned.
    ///
    /// # Errors
    ///
    /// I/O errors surface as `RpcError::Transport`, framing violations as
    /// `RpcError::Protocol`.
    pub async fn next(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                if !self.frames.is_empty() {
                    tracing::debug!(
                        buffered = self.frames.len(),
                        "Stream closed in the middle of a frame"
                    );
                }
                return Ok(None);
            }

            self.queued.extend(self.frames.push(&self.buf[..n])?);
        }
    }
}
