//! Built-in Kubernetes health-check handlers.
//!
//! Kubernetes asks two questions. tern answers them.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust,no_run
//! use tern::{Logger, Method, Router, health::{self, Health}};
//!
//! let app = Router::new(Logger::new("sales-api"))
//!     .on(Method::Get, "/healthz", health::liveness)
//!     .on(Method::Get, "/readyz", Health::new(|| async {
//!         // ping the database, a downstream service, ...
//!         Ok::<(), std::io::Error>(())
//!     }));
//! ```

use std::future::Future;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::failure::BoxError;
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Body of every health response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Status {
    pub status: String,
}

impl Status {
    fn new(status: &str) -> Self {
        Self { status: status.to_owned() }
    }
}

/// Kubernetes liveness probe handler.
///
/// Always returns `200 {"status":"ok"}`. If the process can respond to HTTP
/// at all, it is alive, so this handler has no dependencies.
pub fn liveness(w: &mut ResponseWriter, _req: Request) -> BoxFuture<'_, Outcome> {
    Box::pin(async move {
        w.respond_json(&Status::new("ok"), StatusCode::OK)?;
        Ok(())
    })
}

/// Kubernetes readiness probe handler backed by an async check.
///
/// `200 {"status":"ok"}` when the probe succeeds, `500 {"status":"not ready"}`
/// when it fails. The probe error is not sent to the client.
pub struct Health<P> {
    probe: P,
}

impl<P, Fut, E> Health<P>
where
    P: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

impl<P, Fut, E> Handler for Health<P>
where
    P: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Into<BoxError>,
{
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, _req: Request) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match (self.probe)().await {
                Ok(()) => w.respond_json(&Status::new("ok"), StatusCode::OK)?,
                Err(_) => w.respond_json(&Status::new("not ready"), StatusCode::INTERNAL_SERVER_ERROR)?,
            }
            Ok(())
        })
    }
}
