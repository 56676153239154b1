//! Access logging.

use tracing::info;

use crate::failure::translate;
use crate::log::Logger;
use crate::middleware::Middleware;

/// Emits one `info` record per request after the inner chain returns:
/// committed status, method, path, peer address and latency, all read from
/// the request's own [`Values`](crate::Values).
///
/// When the chain returns a failure that nothing inside it answered, the
/// record carries the status the router will send for it.
pub fn logger(log: Logger) -> Middleware {
    Middleware::from_fn(move |w, req, next| {
        let log = log.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();
            let remote = req.remote_addr();

            let outcome = next.run(w, req).await;

            let values = w.values();
            let status = match &outcome {
                Err(failure) if !w.is_committed() => translate(failure).0,
                _ => values.status_code,
            };
            info!(
                parent: log.span(),
                status = status.as_u16(),
                %method,
                %path,
                remote = ?remote,
                elapsed = ?values.elapsed(),
                "request completed"
            );
            outcome
        })
    })
}
