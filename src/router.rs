//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Middleware given to the
//! router is composed around each handler when it is registered, so a
//! request only pays for the chain it actually runs.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::{debug, error};

use crate::error::Error;
use crate::failure::translate;
use crate::handler::{BoxedHandler, Handler, boxed};
use crate::log::Logger;
use crate::method::Method;
use crate::middleware::{Middleware, compose};
use crate::request::Request;
use crate::response::{ResponseWriter, plain};

/// The application router.
///
/// Build it once at startup, then hand it to [`Server::start`](crate::Server::start).
/// The table is never modified after that. Each [`Router::on`] call returns
/// `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Vec<Middleware>,
    log: Logger,
}

impl Router {
    /// A router with no middleware.
    pub fn new(log: Logger) -> Self {
        Self::with_middleware(log, Vec::new())
    }

    /// A router that wraps every handler registered afterwards in
    /// `middleware`, first entry outermost.
    pub fn with_middleware(log: Logger, middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self {
            routes: HashMap::new(),
            middleware: middleware.into_iter().collect(),
            log,
        }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and `req.param("name")` retrieves
    /// them; a trailing `{*rest}` captures the remainder of the path.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or the method + pattern pair is
    /// already registered. Use [`Router::try_on`] to handle that as an error.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Like [`Router::on`], but reports a bad or duplicate route as
    /// [`Error::Route`].
    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        let composed = compose(&self.middleware, boxed(handler));
        self.routes
            .entry(method)
            .or_default()
            .insert(path, composed)
            .map_err(|source| Error::Route { method, path: path.to_owned(), source })?;
        Ok(self)
    }

    fn lookup(&self, method: Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods registered for a path under any method, sorted.
    fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| *method)
            .collect();
        methods.sort();
        methods
    }

    /// Routes one request and produces its response.
    ///
    /// A matched request gets a fresh [`ResponseWriter`] and runs through the
    /// composed chain. A miss runs no handler and no middleware: the router
    /// answers `405` with an `Allow` header when the path exists under another
    /// method, `404` otherwise.
    ///
    /// A failure that reaches the router unanswered (no [`errors`] layer, or
    /// one placed outside another middleware) is translated here, after every
    /// middleware has returned. [`logger`] accounts for this and records the
    /// translated status; other outer middleware see the writer uncommitted.
    ///
    /// [`errors`]: crate::middleware::errors
    /// [`logger`]: crate::middleware::logger
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let path = req.uri().path().to_owned();
        let found = Method::try_from(req.method())
            .ok()
            .and_then(|method| self.lookup(method, &path));

        let Some((handler, params)) = found else {
            return self.miss(req.method(), &path);
        };

        let mut w = ResponseWriter::new();
        if let Err(failure) = handler.call(&mut w, Request::new(req, params)).await {
            error!(parent: self.log.span(), %path, error = %failure, "unhandled failure");
            if !w.is_committed() {
                let (status, body) = translate(&failure);
                if let Err(e) = w.respond_json(&body, status) {
                    error!(parent: self.log.span(), %path, error = %e, "writing error response");
                }
            }
        }
        w.into_response()
    }

    fn miss(&self, method: &http::Method, path: &str) -> http::Response<Full<Bytes>> {
        let allowed = self.allowed(path);
        if allowed.is_empty() {
            debug!(parent: self.log.span(), %method, path, "no route");
            return plain(StatusCode::NOT_FOUND, "404 page not found");
        }

        debug!(parent: self.log.span(), %method, path, "method not allowed");
        let mut res = plain(StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed");
        let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
        if let Ok(value) = HeaderValue::from_str(&allow) {
            res.headers_mut().insert(ALLOW, value);
        }
        res
    }
}
