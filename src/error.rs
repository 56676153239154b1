//! Infrastructure error type.

use std::io;

use tokio::task::JoinError;

use crate::method::Method;

/// The error type returned by tern's fallible operations.
///
/// Application-level errors (404, 422, etc.) are handler
/// [`Failure`](crate::Failure)s and become HTTP responses. This type covers
/// everything around them: route registration, configuration, and the
/// listener lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route pattern was malformed or already registered.
    #[error("invalid route `{method} {path}`: {source}")]
    Route {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// A configuration value could not be used.
    #[error("config `{key}`: {reason}")]
    Config { key: String, reason: String },

    /// The listener could not bind its address.
    #[error("binding {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed while accepting connections.
    #[error("accepting connections: {0}")]
    Accept(#[source] io::Error),

    /// The OS signal handlers could not be installed.
    #[error("installing signal handler: {0}")]
    Signal(#[source] io::Error),

    /// A connection task failed while being force-closed.
    #[error("forced close failed: {0}")]
    ForcedClose(#[source] JoinError),

    /// The accept loop task ended abnormally.
    #[error("serve task failed: {0}")]
    Task(#[source] JoinError),
}

impl Error {
    /// `true` for errors that should end the process with a non-zero status.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Route { .. } | Self::Config { .. })
    }
}
