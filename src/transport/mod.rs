//! Transport module - local socket helpers.
//!
//! Sessions accept any `AsyncRead + AsyncWrite` stream. On Unix this module
//! provides a listener/connector pair over Unix domain sockets.

#[cfg(unix)]
mod socket;

#[cfg(unix)]
pub use socket::{connect, generate_socket_path, SocketListener};
