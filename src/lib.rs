//! # tern
//!
//! A minimal HTTP service framework for Rust services behind a reverse proxy.
//!
//! ## The contract
//!
//! The proxy handles TLS, rate limiting and body-size limits. tern covers
//! the part that is the same in every JSON API and leaves the rest to the
//! application:
//!
//! - Radix-tree routing with path parameters, one tree per method, via [`matchit`]
//! - Middleware composed around each handler once, at registration
//! - Uniform `{"error": "..."}` responses for handler failures
//! - Per-request status and timing in [`Values`], visible to every layer
//! - Graceful shutdown on SIGTERM / Ctrl-C, bounded by a drain deadline
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tern::middleware;
//! use tern::{BoxFuture, Failure, Logger, Method, Outcome, Request, ResponseWriter};
//! use tern::{Router, Server, ServiceConfig, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tern::Error> {
//!     let log = Logger::new("sales-api");
//!
//!     let app = Router::with_middleware(log.clone(), [
//!             middleware::logger(log.clone()),
//!             middleware::errors(log.clone()),
//!         ])
//!         .on(Method::Get, "/v1/items/{id}", show_item);
//!
//!     Server::new(ServiceConfig::from_env("SALES")?, log).run(app).await?;
//!     Ok(())
//! }
//!
//! fn show_item(w: &mut ResponseWriter, req: Request) -> BoxFuture<'_, Outcome> {
//!     Box::pin(async move {
//!         let id: u32 = req
//!             .param("id")
//!             .unwrap_or_default()
//!             .parse()
//!             .map_err(|e| Failure::new(e, StatusCode::BAD_REQUEST))?;
//!         w.respond_json(&serde_json::json!({ "id": id }), StatusCode::OK)?;
//!         Ok(())
//!     })
//! }
//! ```

mod config;
mod context;
mod error;
mod failure;
mod handler;
mod log;
mod method;
mod request;
mod response;
mod router;
mod server;
mod signal;

pub mod health;
pub mod middleware;

pub use config::ServiceConfig;
pub use context::Values;
pub use error::Error;
pub use failure::{BoxError, ErrorBody, Failure, translate};
pub use handler::{BoxFuture, BoxedHandler, Handler, Outcome, boxed, handler_fn};
pub use http::StatusCode;
pub use log::Logger;
pub use method::{Method, UnknownMethod};
pub use request::Request;
pub use response::{ContentType, ResponseWriter, WriteError};
pub use router::Router;
pub use server::{Listening, Server, State, Stop};
pub use signal::{Signal, shutdown_signal};
