//! Handler failures and their translation into HTTP error responses.
//!
//! A handler reports a problem by returning a [`Failure`]:
//!
//! - **classified**: [`Failure::new`] attaches an explicit status
//!   (`404`, `400`, …). The message is meant for the caller.
//! - **unclassified**: any other error, usually converted by `?`. Translated
//!   to `500 Internal Server Error`.
//!
//! [`translate`] turns either into a status and an [`ErrorBody`]. Both kinds
//! put the underlying message in the body verbatim; for unclassified
//! failures this can leak internal detail to clients.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Boxed error carried by a [`Failure`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The error half of a handler [`Outcome`](crate::Outcome).
///
/// `Failure` deliberately does not implement [`std::error::Error`], which is
/// what allows the blanket `From` impl below: any error type converts into an
/// unclassified failure with `?`.
#[derive(Debug)]
pub enum Failure {
    /// An error without an HTTP status. Translated to `500`.
    Cause(BoxError),
    /// An error carrying the status chosen by the handler.
    Status { source: BoxError, status: StatusCode },
}

impl Failure {
    /// Wraps `err` with an explicit HTTP status.
    ///
    /// ```rust
    /// use tern::Failure;
    /// use http::StatusCode;
    ///
    /// let f = Failure::new("item not found", StatusCode::NOT_FOUND);
    /// assert_eq!(f.status(), Some(StatusCode::NOT_FOUND));
    /// ```
    pub fn new(err: impl Into<BoxError>, status: StatusCode) -> Self {
        Self::Status { source: err.into(), status }
    }

    /// An unclassified failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Cause(message.into().into())
    }

    /// The status attached by the handler, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Cause(_) => None,
            Self::Status { status, .. } => Some(*status),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.status().is_some()
    }

    /// The underlying error.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        match self {
            Self::Cause(err) | Self::Status { source: err, .. } => err.as_ref(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.cause(), f)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::Cause(Box::new(err))
    }
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Wire shape of every error response: `{"error":"<message>"}`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps a failure to the status and body sent to the client.
pub fn translate(failure: &Failure) -> (StatusCode, ErrorBody) {
    let status = failure.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, ErrorBody { error: failure.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_failure_keeps_status_and_message() {
        let (status, body) = translate(&Failure::new("item 42 not found", StatusCode::NOT_FOUND));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"item 42 not found"}"#);
    }

    #[test]
    fn unclassified_failure_is_500_with_message_exposed() {
        fn parse() -> Result<u32, Failure> {
            Ok("forty-two".parse::<u32>()?)
        }

        let failure = parse().unwrap_err();
        assert!(!failure.is_classified());

        let (status, body) = translate(&failure);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "invalid digit found in string");
    }

    #[test]
    fn msg_builds_an_unclassified_failure() {
        let failure = Failure::msg("database unavailable");
        assert_eq!(failure.status(), None);
        assert_eq!(failure.to_string(), "database unavailable");
    }
}
