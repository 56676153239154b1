//! Per-request state shared along one middleware chain.
//!
//! Every request gets exactly one [`Values`]. It lives inside the request's
//! [`ResponseWriter`](crate::ResponseWriter), which every layer receives by
//! `&mut`, so an outer middleware can read what the inner chain committed:
//!
//! ```text
//! logger ──▶ errors ──▶ handler
//!   │                     │ w.respond_json(.., 201)  → values.status_code = 201
//!   ◀─────────────────────┘
//!   reads w.values().status_code and w.values().start.elapsed()
//! ```
//!
//! There is no lookup by key and no sharing across requests, so no locking.

use std::time::{Duration, Instant};

use http::StatusCode;

/// Status and timing for one in-flight request.
#[derive(Clone, Copy, Debug)]
pub struct Values {
    /// Status of the committed response. `200 OK` until something commits,
    /// which is also what the client receives for an empty response.
    pub status_code: StatusCode,
    /// When dispatch began for this request.
    pub start: Instant,
}

impl Values {
    pub(crate) fn new() -> Self {
        Self { status_code: StatusCode::OK, start: Instant::now() }
    }

    /// Time elapsed since dispatch began.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
