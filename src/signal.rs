//! Process stop signals.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//! Keep the service's `shutdown_timeout` below that so the forced close
//! happens on our terms, not the kubelet's.

use std::fmt;
use std::io;

/// The stop request the process received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM, sent by `kubectl` and container runtimes.
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        })
    }
}

/// Resolves on the first stop signal the process receives.
///
/// On Unix this listens for both SIGTERM and SIGINT. On Windows only Ctrl-C
/// is available. Fails if a handler cannot be installed.
pub async fn shutdown_signal() -> io::Result<Signal> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = ctrl_c => res.map(|()| Signal::Interrupt),
        () = terminate => Ok(Signal::Terminate),
    }
}
