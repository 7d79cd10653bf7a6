//! Session configuration.
//!
//! [`SessionConfig`] is shared by the dispatcher and the invoker. It can be
//! built in code with the fluent setters or loaded from JSON, where every
//! field is optional and durations are plain millisecond counts:
//!
//! ```
//! use std::time::Duration;
//! use pactwire::config::SessionConfig;
//!
//! let config = SessionConfig::from_json(
//!     r#"{ "call_timeout_ms": 250, "writer": { "max_pending_frames": 64 } }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.call_timeout, Duration::from_millis(250));
//! assert_eq!(config.writer.max_pending_frames, 64);
//! assert_eq!(config.max_concurrent_handlers, 256);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE};
use crate::writer::WriterConfig;

/// Default maximum concurrent handlers per session.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Default deadline for a call without an explicit timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the handshake exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default size of the per-session read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Largest frame payload. A bigger incoming frame closes the session; a
    /// bigger outgoing frame fails only its own call.
    pub max_frame_size: u32,
    /// Deadline for calls made with [`Invoker::call`](crate::Invoker::call).
    #[serde(rename = "call_timeout_ms", with = "millis")]
    pub call_timeout: Duration,
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,
    /// Handlers running at once before new calls are answered `Overloaded`.
    pub max_concurrent_handlers: usize,
    pub read_buffer_size: usize,
    pub writer: WriterConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    ///
    /// `max_frame_size` is clamped to [`ABSOLUTE_MAX_FRAME_SIZE`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        let size = config.max_frame_size;
        Ok(config.max_frame_size(size))
    }

    /// Set the maximum frame payload size.
    ///
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size.min(ABSOLUTE_MAX_FRAME_SIZE);
        self
    }

    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent handlers.
    ///
    /// When this limit is reached, new calls are answered with an
    /// `Overloaded` error.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.writer.max_pending_frames = limit;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer.channel_capacity = capacity;
        self
    }

    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.writer.backpressure_timeout = timeout;
        self
    }
}

/// Serde adapter for durations written as integer milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
