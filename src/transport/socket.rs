//! Unix domain socket transport.
//!
//! Sessions run over any `AsyncRead + AsyncWrite` stream; these helpers cover
//! the common local case of a listener bound to a filesystem path.
//!
//! # Example
//!
//! ```no_run
//! use pactwire::transport::{connect, generate_socket_path, SocketListener};
//!
//! # async fn run() -> pactwire::Result<()> {
//! let path = generate_socket_path();
//! let listener = SocketListener::bind(&path).await?;
//! let client = connect(&path).await?;
//! let server = listener.accept().await?;
//! # let _ = (client, server);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;

/// Generate a unique socket path for this process.
///
/// Format: `{temp_dir}/pactwire-{pid}-{random}.sock`
pub fn generate_socket_path() -> PathBuf {
    let pid = std::process::id();
    std::env::temp_dir().join(format!("pactwire-{}-{:x}.sock", pid, rand_u64()))
}

/// Time-seeded value mixed with a per-process counter so consecutive calls
/// never collide.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    nanos.wrapping_mul(0x517cc1b727220a95) ^ (std::process::id() as u64) ^ (seq << 48) ^ seq
}

/// Unix domain socket listener that removes its socket file on drop.
#[derive(Debug)]
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketListener {
    /// Bind to a socket path.
    ///
    /// Removes any existing socket file at the path before binding.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        tracing::debug!(path = %path.display(), "Socket listener bound");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Connect to a listening socket.
pub async fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
    Ok(UnixStream::connect(path).await?)
}
