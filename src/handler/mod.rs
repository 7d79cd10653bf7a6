//! Handler module - operation implementations and their registry.
//!
//! Provides:
//! - [`Handler`] - the raw, value-level handler trait
//! - [`TypedHandler`] / [`SyncHandler`] - adapters over [`Wire`](crate::codec::Wire) types
//! - [`HandlerRegistry`] - maps operation names to handlers
//! - [`CallContext`] - per-call metadata

mod context;
mod registry;

pub use context::CallContext;
pub use registry::{
    BoxFuture, Handler, HandlerRegistry, HandlerResult, RawHandler, SyncHandler, TypedHandler,
};
