//! Handler registry for dispatching calls by operation name.
//!
//! Handlers work on decoded [`Value`]s. The typed adapters convert the
//! argument list and the result through the [`Wire`] traits so application
//! code can take plain Rust types.
//!
//! # Example
//!
//! ```
//! use pactwire::error::DispatchError;
//! use pactwire::handler::{CallContext, HandlerRegistry, SyncHandler, TypedHandler};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("square", SyncHandler::new(|(n,): (i64,)| Ok(n * n)));
//! registry.register(
//!     "greet",
//!     TypedHandler::new(|(name,): (String,), _ctx: CallContext| async move {
//!         Ok::<_, DispatchError>(format!("hello {}", name))
//!     }),
//! );
//!
//! assert!(registry.get("square").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::CallContext;
use crate::codec::{Value, Wire, WireArgs};
use crate::error::DispatchError;

/// Result type for handler functions.
pub type HandlerResult = Result<Value, DispatchError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An operation implementation.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call with its decoded argument list.
    fn call(&self, args: Vec<Value>, ctx: CallContext) -> BoxFuture<'static, HandlerResult>;
}

/// Handler over raw values.
pub struct RawHandler<F> {
    handler: F,
}

impl<F, Fut> RawHandler<F>
where
    F: Fn(Vec<Value>, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for RawHandler<F>
where
    F: Fn(Vec<Value>, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>, ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(args, ctx))
    }
}

/// Async handler taking typed arguments.
pub struct TypedHandler<F, A, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(A) -> (R, Fut)>,
}

impl<F, A, R, Fut> TypedHandler<F, A, R, Fut>
where
    F: Fn(A, CallContext) -> Fut + Send + Sync + 'static,
    A: WireArgs + Send + 'static,
    R: Wire + Send + 'static,
    Fut: Future<Output = Result<R, DispatchError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, R, Fut> Handler for TypedHandler<F, A, R, Fut>
where
    F: Fn(A, CallContext) -> Fut + Send + Sync + 'static,
    A: WireArgs + Send + 'static,
    R: Wire + Send + 'static,
    Fut: Future<Output = Result<R, DispatchError>> + Send + 'static,
{
    fn call(&self, args: Vec<Value>, ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        let parsed = match A::from_values(args) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(DispatchError::from(e)) }),
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move { fut.await.map(Wire::into_value) })
    }
}

/// Synchronous handler taking typed arguments.
///
/// Runs inline on the handler task; use [`TypedHandler`] for anything that
/// awaits.
pub struct SyncHandler<F, A, R> {
    handler: F,
    _phantom: PhantomData<fn(A) -> R>,
}

impl<F, A, R> SyncHandler<F, A, R>
where
    F: Fn(A) -> Result<R, DispatchError> + Send + Sync + 'static,
    A: WireArgs + 'static,
    R: Wire + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, R> Handler for SyncHandler<F, A, R>
where
    F: Fn(A) -> Result<R, DispatchError> + Send + Sync + 'static,
    A: WireArgs + 'static,
    R: Wire + 'static,
{
    fn call(&self, args: Vec<Value>, _ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        let result = A::from_values(args)
            .map_err(DispatchError::from)
            .and_then(|parsed| (self.handler)(parsed))
            .map(Wire::into_value);
        Box::pin(async move { result })
    }
}

/// Registry mapping operation names to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler) {
        self.register_arc(name, Arc::new(handler));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(operation = %name, "Replaced handler");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered operation names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("operations", &names)
            .finish()
    }
}
