//! Request counters.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tern::{Logger, Method, Router};
//! use tern::middleware::{self, metrics::Metrics};
//!
//! let stats = Arc::new(Metrics::default());
//! let log = Logger::new("sales-api");
//! let app = Router::with_middleware(log.clone(), [
//!         middleware::logger(log.clone()),
//!         middleware::errors(log),
//!         middleware::metrics(Arc::clone(&stats)),
//!     ])
//!     .on(Method::Get, "/debug/vars", Metrics::handler(&stats));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::handler::{BoxFuture, Handler, Outcome};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Counters shared by every request that passes the [`metrics`] middleware.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    failures: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    pub requests: u64,
    pub failures: u64,
    pub in_flight: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// A handler that serves the current [`Snapshot`] as JSON.
    pub fn handler(metrics: &Arc<Self>) -> impl Handler {
        SnapshotHandler(Arc::clone(metrics))
    }
}

/// Counts requests, requests in flight, and failures returned by the inner
/// chain. Place it inside [`errors`](super::errors) to see failures before
/// they are translated.
pub fn metrics(metrics: Arc<Metrics>) -> Middleware {
    Middleware::from_fn(move |w, req, next| {
        let metrics = Arc::clone(&metrics);
        Box::pin(async move {
            metrics.requests.fetch_add(1, Ordering::Relaxed);
            let _guard = InFlight::enter(&metrics);

            let outcome = next.run(w, req).await;
            if outcome.is_err() {
                metrics.failures.fetch_add(1, Ordering::Relaxed);
            }
            outcome
        })
    })
}

/// Decrements `in_flight` on drop, so aborted requests are not counted forever.
struct InFlight<'a>(&'a Metrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct SnapshotHandler(Arc<Metrics>);

impl Handler for SnapshotHandler {
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, _req: Request) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            w.respond_json(&self.0.snapshot(), StatusCode::OK)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::Failure;
    use crate::handler::{boxed, handler_fn};
    use crate::middleware::compose;
    use crate::middleware::tests::request;

    #[tokio::test]
    async fn counts_requests_and_failures() {
        let stats = Arc::new(Metrics::default());
        let flaky = boxed(handler_fn(|_w, req| {
            Box::pin(async move {
                if req.path() == "/fail" {
                    return Err(Failure::msg("nope"));
                }
                Ok(())
            })
        }));
        let chain = compose(&[metrics(Arc::clone(&stats))], flaky);

        for path in ["/ok", "/fail", "/ok"] {
            let mut w = ResponseWriter::new();
            let _ = chain.call(&mut w, request(path)).await;
        }

        assert_eq!(stats.snapshot(), Snapshot { requests: 3, failures: 1, in_flight: 0 });
    }

    #[tokio::test]
    async fn snapshot_handler_serves_json() {
        let stats = Arc::new(Metrics::default());
        stats.requests.fetch_add(4, Ordering::Relaxed);

        let mut w = ResponseWriter::new();
        Metrics::handler(&stats).call(&mut w, request("/debug/vars")).await.unwrap();

        assert_eq!(w.values().status_code, StatusCode::OK);
        assert!(w.is_committed());
    }
}
