//! Handler trait and type erasure.
//!
//! # The handler shape
//!
//! Every route handler and every middleware layer has the same shape: it
//! borrows the request's [`ResponseWriter`] mutably, takes the [`Request`] by
//! value, and resolves to an [`Outcome`]:
//!
//! ```text
//! fn(&'a mut ResponseWriter, Request) -> BoxFuture<'a, Outcome>
//! ```
//!
//! The future borrows the writer for `'a`, which is why the return type is a
//! boxed future tied to that lifetime rather than a plain `async fn`. In
//! practice a handler is written as:
//!
//! ```rust
//! use tern::{BoxFuture, Outcome, Request, ResponseWriter, StatusCode};
//!
//! fn hello(w: &mut ResponseWriter, _req: Request) -> BoxFuture<'_, Outcome> {
//!     Box::pin(async move {
//!         w.text(StatusCode::OK, "hello")?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! # How handlers are stored
//!
//! The router holds handlers of different concrete types in one table, so it
//! stores them as [`BoxedHandler`] (`Arc<dyn Handler>`). The per-request cost
//! is one Arc clone and one virtual call per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::failure::Failure;
use crate::request::Request;
use crate::response::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the request's writer for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of running a handler: the response is already in the writer on
/// `Ok`, or the chain reports a [`Failure`] for translation.
pub type Outcome = Result<(), Failure>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Request-processing logic: route handlers and middleware-wrapped chains.
///
/// Implemented automatically for functions and closures of the right shape
/// (see [`handler_fn`] for closures). Implement it by hand for handlers that
/// carry their own state:
///
/// ```rust
/// use tern::{BoxFuture, Handler, Outcome, Request, ResponseWriter, StatusCode};
///
/// struct Greeting(String);
///
/// impl Handler for Greeting {
///     fn call<'a>(&'a self, w: &'a mut ResponseWriter, _req: Request) -> BoxFuture<'a, Outcome> {
///         Box::pin(async move {
///             w.text(StatusCode::OK, self.0.clone())?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, Outcome>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut ResponseWriter, Request) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, Outcome> {
        (self)(w, req)
    }
}

/// Pins a closure to the handler signature.
///
/// Closure argument lifetimes are only inferred as higher-ranked when the
/// closure is passed straight to a matching `Fn` bound, which this function
/// provides:
///
/// ```rust
/// use tern::{handler_fn, Handler, StatusCode};
///
/// let h = handler_fn(|w, _req| Box::pin(async move {
///     w.respond_status(StatusCode::NO_CONTENT)?;
///     Ok(())
/// }));
/// # fn assert_handler(_: impl Handler) {}
/// # assert_handler(h);
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut ResponseWriter, Request) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    f
}

/// Erases a concrete handler into the shared form the router stores.
pub fn boxed(handler: impl Handler) -> BoxedHandler {
    Arc::new(handler)
}
