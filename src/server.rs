//! HTTP server and graceful shutdown.
//!
//! [`Server::start`] binds and serves in a background task and hands back a
//! [`Listening`] controller. The controller waits for whichever comes first:
//! a fatal transport error or a shutdown trigger.
//!
//! ```text
//! Idle ──bind──▶ Listening ──fatal error──▶ Failed
//!                    │
//!                 shutdown
//!                    ▼
//!              ShuttingDown ──drained or forced──▶ Stopped
//! ```
//!
//! On shutdown the server:
//! 1. Stops accepting. The listener is dropped, so new connections are refused.
//! 2. Tells every open connection to finish its in-flight request and close
//!    instead of waiting for another one.
//! 3. Waits up to `shutdown_timeout` for those connections, then closes the
//!    rest.
//!
//! Both outcomes of step 3 are successful stops; the caller can tell them
//! apart through [`Stop`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::error::Error;
use crate::log::Logger;
use crate::response::plain;
use crate::router::Router;
use crate::signal::{Signal, shutdown_signal};

/// Pause before retrying `accept` when the process is out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ── State / Stop ──────────────────────────────────────────────────────────────

/// Lifecycle phase, published through [`Listening::state`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Started, not yet bound.
    Idle,
    /// Accepting connections.
    Listening,
    /// Ended by a fatal transport error.
    Failed,
    /// No longer accepting; draining open connections.
    ShuttingDown,
    /// Drain finished.
    Stopped,
}

/// How a requested shutdown ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stop {
    /// Every open connection finished within `shutdown_timeout`.
    Graceful,
    /// The deadline passed and `remaining` connections were closed.
    Forced { remaining: usize },
}

/// First event wins: either the serve task failed or someone asked to stop.
enum Event {
    Fatal(Error),
    Shutdown(Option<Signal>),
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server.
///
/// ```rust,no_run
/// use tern::{Logger, Method, Router, Server, ServiceConfig, health};
///
/// #[tokio::main]
/// async fn main() -> Result<(), tern::Error> {
///     let log = Logger::new("sales-api");
///     let app = Router::new(log.clone()).on(Method::Get, "/healthz", health::liveness);
///
///     let stop = Server::new(ServiceConfig::from_env("SALES")?, log).run(app).await?;
///     println!("stopped: {stop:?}");
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServiceConfig,
    log: Logger,
}

impl Server {
    pub fn new(config: ServiceConfig, log: Logger) -> Self {
        Self { config, log }
    }

    /// Spawns the serve task and returns immediately.
    ///
    /// Must be called from within a tokio runtime. Binding happens in the
    /// background; a bind failure surfaces from the `wait_*` call on the
    /// returned [`Listening`].
    pub fn start(self, router: Router) -> Listening {
        let (state_tx, _) = watch::channel(State::Idle);
        let state = Arc::new(state_tx);
        let addr = Arc::new(OnceLock::new());
        let (events_tx, events) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(serve(
            Arc::new(self.config),
            Arc::new(router),
            self.log.clone(),
            Arc::clone(&state),
            Arc::clone(&addr),
            events_tx.clone(),
            stop_rx,
        ));

        Listening {
            state,
            addr,
            events,
            events_tx,
            stop: Some(stop_tx),
            task,
            log: self.log,
        }
    }

    /// Serves until SIGINT or SIGTERM, then shuts down gracefully.
    pub async fn run(self, router: Router) -> Result<Stop, Error> {
        self.start(router).wait_for_signal().await
    }
}

// ── Listening ─────────────────────────────────────────────────────────────────

/// Handle to a started server.
///
/// Dropping it without calling one of the `wait_*` methods also stops the
/// server, without waiting for the drain.
pub struct Listening {
    state: Arc<watch::Sender<State>>,
    addr: Arc<OnceLock<SocketAddr>>,
    events: mpsc::Receiver<Event>,
    events_tx: mpsc::Sender<Event>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<Stop, Error>>,
    log: Logger,
}

impl Listening {
    /// The bound address, once binding has been attempted. `None` if it failed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s != State::Idle).await;
        self.addr.get().copied()
    }

    /// A receiver for lifecycle changes.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Waits for SIGINT or SIGTERM, then shuts down.
    pub async fn wait_for_signal(self) -> Result<Stop, Error> {
        self.wait_with(async { shutdown_signal().await.map(Some) }).await
    }

    /// Waits for `shutdown` to resolve, then shuts down.
    pub async fn wait_for<F>(self, shutdown: F) -> Result<Stop, Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.wait_with(async move {
            shutdown.await;
            Ok(None)
        })
        .await
    }

    async fn wait_with<F>(mut self, trigger: F) -> Result<Stop, Error>
    where
        F: Future<Output = io::Result<Option<Signal>>> + Send + 'static,
    {
        let events_tx = self.events_tx.clone();
        let watcher = tokio::spawn(async move {
            let event = match trigger.await {
                Ok(signal) => Event::Shutdown(signal),
                Err(e) => Event::Fatal(Error::Signal(e)),
            };
            let _ = events_tx.try_send(event);
        });

        let event = tokio::select! {
            biased;
            event = self.events.recv() => event,
            // Only reachable if the serve task panicked before publishing.
            res = &mut self.task => {
                watcher.abort();
                self.state.send_replace(State::Failed);
                return match res {
                    Ok(result) => result,
                    Err(e) => Err(Error::Task(e)),
                };
            }
        };
        self.events.close();
        watcher.abort();

        match event {
            Some(Event::Fatal(err)) => {
                self.state.send_replace(State::Failed);
                error!(parent: self.log.span(), error = %err, "server failed");
                self.task.abort();
                Err(err)
            }
            Some(Event::Shutdown(signal)) => self.shutdown(signal).await,
            None => self.shutdown(None).await,
        }
    }

    async fn shutdown(mut self, signal: Option<Signal>) -> Result<Stop, Error> {
        match signal {
            Some(signal) => info!(parent: self.log.span(), %signal, "shutdown started"),
            None => info!(parent: self.log.span(), "shutdown started"),
        }

        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        let result = match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(Error::Task(e)),
        };

        match &result {
            Ok(stop) => {
                self.state.send_replace(State::Stopped);
                info!(parent: self.log.span(), ?stop, "server stopped");
            }
            Err(e) => {
                self.state.send_replace(State::Failed);
                error!(parent: self.log.span(), error = %e, "shutdown failed");
            }
        }
        result
    }
}

// ── Serve task ────────────────────────────────────────────────────────────────

async fn serve(
    config: Arc<ServiceConfig>,
    router: Arc<Router>,
    log: Logger,
    state: Arc<watch::Sender<State>>,
    addr: Arc<OnceLock<SocketAddr>>,
    events: mpsc::Sender<Event>,
    mut stop: oneshot::Receiver<()>,
) -> Result<Stop, Error> {
    let publish = |err: Error| {
        error!(parent: log.span(), error = %err, "transport error");
        if events.try_send(Event::Fatal(err)).is_ok() {
            state.send_replace(State::Failed);
        }
    };

    let listener = match bind(&config.address).await {
        Ok(listener) => listener,
        Err(err) => {
            publish(err);
            let _ = stop.await;
            return Ok(Stop::Graceful);
        }
    };
    if let Ok(local) = listener.local_addr() {
        let _ = addr.set(local);
        info!(parent: log.span(), addr = %local, "listening");
    }
    state.send_replace(State::Listening);

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(config.read_timeout);

    let graceful = GracefulShutdown::new();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Checked first so a stop request wins over queued connections.
            biased;

            _ = &mut stop => break,

            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    let config = Arc::clone(&config);
                    let router = Arc::clone(&router);
                    let conn_log = log.clone();
                    let svc = service_fn(move |req| {
                        handle(Arc::clone(&config), Arc::clone(&router), conn_log.clone(), req, peer)
                    });

                    let conn = builder.serve_connection(TokioIo::new(stream), svc).into_owned();
                    let conn = graceful.watch(conn);
                    let conn_log = log.clone();
                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(parent: conn_log.span(), %peer, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) if is_transient(&e) => {
                    debug!(parent: log.span(), error = %e, "accept failed, retrying");
                }
                Err(e) if is_fd_exhausted(&e) => {
                    warn!(parent: log.span(), error = %e, "out of file descriptors, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(e) => {
                    publish(Error::Accept(e));
                    let _ = (&mut stop).await;
                    break;
                }
            },

            // Reap finished connection tasks so the set does not grow without
            // bound on long-running servers.
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = res {
                    error!(parent: log.span(), error = %e, "connection task failed");
                }
            }
        }
    }

    drop(listener);
    state.send_replace(State::ShuttingDown);
    info!(parent: log.span(), in_flight = tasks.len(), "draining connections");

    let drained = timeout(config.shutdown_timeout, async {
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_ok() {
        return Ok(Stop::Graceful);
    }

    let remaining = tasks.len();
    warn!(
        parent: log.span(),
        remaining,
        timeout = ?config.shutdown_timeout,
        "shutdown timeout elapsed, closing connections"
    );
    tasks.abort_all();
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                return Err(Error::ForcedClose(e));
            }
        }
    }
    Ok(Stop::Forced { remaining })
}

async fn bind(address: &str) -> Result<TcpListener, Error> {
    TcpListener::bind(address).await.map_err(|source| Error::Bind {
        addr: address.to_owned(),
        source,
    })
}

/// Accept errors that concern one connection, not the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// ENFILE / EMFILE.
fn is_fd_exhausted(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23 | 24))
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Reads the body under `read_timeout`, then dispatches under `write_timeout`.
///
/// A handler that overruns `write_timeout` produces no response: the error
/// makes hyper drop the connection.
async fn handle(
    config: Arc<ServiceConfig>,
    router: Arc<Router>,
    log: Logger,
    req: http::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Elapsed> {
    let (mut parts, body) = req.into_parts();

    let body = match timeout(config.read_timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            debug!(parent: log.span(), %peer, error = %e, "reading request body");
            return Ok(plain(StatusCode::BAD_REQUEST, "400 bad request"));
        }
        Err(_) => {
            debug!(parent: log.span(), %peer, "request body read timed out");
            return Ok(plain(StatusCode::REQUEST_TIMEOUT, "408 request timeout"));
        }
    };

    parts.extensions.insert(peer);
    let path = parts.uri.path().to_owned();
    let req = http::Request::from_parts(parts, body);

    timeout(config.write_timeout, router.dispatch(req))
        .await
        .inspect_err(|_| {
            warn!(parent: log.span(), %peer, %path, timeout = ?config.write_timeout, "response timed out, dropping connection");
        })
}
