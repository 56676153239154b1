//! Middleware and composition.
//!
//! A [`Middleware`] turns one handler into another. The router applies its
//! middleware list to each handler once, at registration time, with
//! [`compose`]:
//!
//! ```text
//! compose([m1, m2, m3], h)  ==  m1(m2(m3(h)))
//!
//! m1 pre → m2 pre → m3 pre → h → m3 post → m2 post → m1 post
//! ```
//!
//! A middleware that never calls the handler it wraps short-circuits the
//! rest of the chain and decides the outcome itself.
//!
//! Built-in middleware:
//! - [`logger`]: one access record per request: status, method, path, latency
//! - [`errors`]: turns every [`Failure`](crate::Failure) into a JSON error response
//! - [`metrics`]: request, failure and in-flight counters
//!
//! The usual order is `[logger(log), errors(log), ...]`, so `errors` sits
//! closest to the business handler and `logger` sees the final status.

use std::fmt;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::request::Request;
use crate::response::ResponseWriter;

mod errors;
mod logger;
pub mod metrics;

pub use errors::errors;
pub use logger::logger;
pub use metrics::metrics;

type Wrap = dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync;

/// A handler decorator.
///
/// Anything it needs (a logger, counters) is captured when it is built and
/// never changes afterwards. Cloning is cheap.
#[derive(Clone)]
pub struct Middleware(Arc<Wrap>);

impl Middleware {
    /// Builds a middleware from a raw `handler -> handler` function.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Builds a middleware from a function that receives the rest of the
    /// chain as [`Next`]:
    ///
    /// ```rust
    /// use tern::middleware::Middleware;
    /// use tern::StatusCode;
    ///
    /// let require_key = Middleware::from_fn(|w, req, next| Box::pin(async move {
    ///     if req.header("x-api-key").is_none() {
    ///         w.respond_status(StatusCode::UNAUTHORIZED)?;
    ///         return Ok(());
    ///     }
    ///     next.run(w, req).await
    /// }));
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut ResponseWriter, Request, Next<'a>) -> BoxFuture<'a, Outcome>
            + Send
            + Sync
            + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |next| {
            let layer: BoxedHandler = Arc::new(FromFn { f: Arc::clone(&f), next });
            layer
        })
    }

    /// Applies this middleware to `handler`.
    pub fn wrap(&self, handler: BoxedHandler) -> BoxedHandler {
        (self.0)(handler)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Wraps `middleware` around `handler` so the first entry runs first.
pub fn compose(middleware: &[Middleware], handler: BoxedHandler) -> BoxedHandler {
    middleware.iter().rev().fold(handler, |next, mw| mw.wrap(next))
}

/// The remainder of the chain, as seen from inside [`Middleware::from_fn`].
pub struct Next<'a> {
    inner: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    /// Runs the wrapped handler. The writer is only reborrowed, so it can
    /// still be inspected after the call returns.
    pub fn run<'b>(self, w: &'b mut ResponseWriter, req: Request) -> BoxFuture<'b, Outcome>
    where
        'a: 'b,
    {
        let inner: &'b dyn Handler = &**self.inner;
        inner.call(w, req)
    }
}

struct FromFn<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F> Handler for FromFn<F>
where
    F: for<'a> Fn(&'a mut ResponseWriter, Request, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, Outcome> {
        (self.f)(w, req, Next { inner: &self.next })
    }
}
