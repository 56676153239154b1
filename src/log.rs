//! The logger handed to every component that writes diagnostics.
//!
//! `tern` emits `tracing` events, but never through a logger it looks up on
//! its own: the router, the built-in middleware and the server each take a
//! [`Logger`] at construction and parent their events on its span. The
//! subscriber (the actual backend) is left to the binary.

use tracing::Span;

/// A cloneable handle that scopes every event a component emits.
#[derive(Clone, Debug)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// A logger whose events are grouped under an `info`-level `service` span.
    ///
    /// Create it after installing the subscriber; a span created with no
    /// subscriber in place stays disabled.
    pub fn new(service: &'static str) -> Self {
        Self { span: tracing::info_span!("service", service) }
    }

    /// Uses an existing span as the parent of every event.
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// Events are still emitted, but as root events with no parent span.
    pub fn detached() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
