//! # pactwire
//!
//! Contract-checked remote procedure calls over any ordered byte stream.
//!
//! A service is described by a [`Contract`](contract::Contract): named
//! operations with typed arguments and return values, each backed by a codec
//! from a [`CodecRegistry`](codec::CodecRegistry). Both sides derive SHA-256
//! signatures from the contract and compare them in a handshake before any
//! call flows, so drift between caller and callee is reported as the exact
//! list of missing operations instead of a decode error mid-call.
//!
//! ## Architecture
//!
//! - **Codecs** (`codec`): binary value algebra with optional, sequence,
//!   tuple and union combinators
//! - **Contract** (`contract`): operations, signatures and a JSON manifest
//! - **Protocol** (`protocol`): length-prefixed frames and the handshake
//! - **Dispatcher** (server role): runs handlers concurrently per session
//! - **Invoker** (client role): multiplexes calls with timeouts and cancellation
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use pactwire::codec::CodecRegistry;
//! use pactwire::contract::Contract;
//! use pactwire::{Dispatcher, Invoker};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pactwire::Result<()> {
//! let contract = Arc::new(
//!     Contract::empty(Arc::new(CodecRegistry::with_primitives()))
//!         .with_typed_operation::<(i64,), i64>("factorial")?,
//! );
//!
//! let dispatcher = Dispatcher::builder(contract.clone())
//!     .handle_sync("factorial", |(n,): (i64,)| Ok((1..=n).product::<i64>()))
//!     .build()?;
//!
//! let (client_io, server_io) = tokio::io::duplex(64 * 1024);
//! tokio::spawn(async move { dispatcher.serve(server_io).await });
//!
//! let invoker = Invoker::builder(contract).connect(client_io).await?;
//! let result: i64 = invoker.call_typed("factorial", (5i64,)).await?;
//! assert_eq!(result, 120);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

mod client;
mod pending;
mod reader;
mod server;

pub use client::{Invoker, InvokerBuilder, PendingResponse};
pub use config::SessionConfig;
pub use error::{Result, RpcError};
pub use handler::CallContext;
pub use reader::FrameReader;
pub use server::{Dispatcher, DispatcherBuilder};
