//! Uniform error responses.

use tracing::{error, warn};

use crate::failure::translate;
use crate::log::Logger;
use crate::middleware::Middleware;

/// Converts every [`Failure`](crate::Failure) the inner chain returns into a
/// `{"error": "<message>"}` response and logs it.
///
/// Server errors (`5xx`) log at `error`, classified client errors at `warn`.
/// If the error body cannot be written (the handler already committed a
/// response, say), that is logged and otherwise ignored. The chain outcome
/// seen by outer middleware is always `Ok`.
pub fn errors(log: Logger) -> Middleware {
    Middleware::from_fn(move |w, req, next| {
        let log = log.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();

            let Err(failure) = next.run(w, req).await else {
                return Ok(());
            };

            let (status, body) = translate(&failure);
            if status.is_server_error() {
                error!(parent: log.span(), status = status.as_u16(), %method, %path, error = %failure, "request failed");
            } else {
                warn!(parent: log.span(), status = status.as_u16(), %method, %path, error = %failure, "request rejected");
            }

            if let Err(e) = w.respond_json(&body, status) {
                error!(parent: log.span(), %method, %path, error = %e, "writing error response");
            }
            Ok(())
        })
    })
}
