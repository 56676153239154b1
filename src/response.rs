//! The response sink handed to every handler.
//!
//! A handler writes its response into a [`ResponseWriter`] instead of
//! returning one. This is what lets the errors middleware answer on the
//! handler's behalf, and what lets outer middleware observe the committed
//! status through [`ResponseWriter::values`] after the inner chain returns.
//!
//! ```rust,ignore
//! fn show(w: &mut ResponseWriter, req: Request) -> BoxFuture<'_, Outcome> {
//!     Box::pin(async move {
//!         let id = req.param("id").unwrap_or_default().to_owned();
//!         w.respond_json(&Item { id }, StatusCode::OK)?;
//!         Ok(())
//!     })
//! }
//! ```

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

use crate::context::Values;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types for [`ResponseWriter::respond`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── WriteError ────────────────────────────────────────────────────────────────

/// Failure to write a response into the sink.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A response was already committed for this request.
    #[error("response already written with status {0}")]
    AlreadyCommitted(StatusCode),

    /// The value could not be encoded as JSON.
    #[error("encoding response body: {0}")]
    Encode(#[from] serde_json::Error),
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Collects the single response for one request.
///
/// The first `respond*` call commits the status and body. Any later call
/// fails with [`WriteError::AlreadyCommitted`] and leaves the committed
/// response untouched. Headers may be added until the chain returns.
#[derive(Debug)]
pub struct ResponseWriter {
    values: Values,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
}

impl ResponseWriter {
    pub(crate) fn new() -> Self {
        Self {
            values: Values::new(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            committed: false,
        }
    }

    /// Per-request status and timing.
    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// `true` once a status and body have been written.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Serialises `value` as JSON and commits it with `status`.
    ///
    /// `204 No Content` commits the status without a body.
    pub fn respond_json<T>(&mut self, value: &T, status: StatusCode) -> Result<(), WriteError>
    where
        T: Serialize + ?Sized,
    {
        if status == StatusCode::NO_CONTENT {
            return self.respond_status(status);
        }
        self.ensure_open()?;
        let body = serde_json::to_vec(value)?;
        self.commit(status, Some(ContentType::Json), Bytes::from(body))
    }

    /// Commits `body` with an explicit content type.
    pub fn respond(
        &mut self,
        status: StatusCode,
        content_type: ContentType,
        body: impl Into<Bytes>,
    ) -> Result<(), WriteError> {
        self.commit(status, Some(content_type), body.into())
    }

    /// Commits a plain-text body.
    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> Result<(), WriteError> {
        self.commit(status, Some(ContentType::Text), Bytes::from(body.into()))
    }

    /// Commits a status with no body.
    pub fn respond_status(&mut self, status: StatusCode) -> Result<(), WriteError> {
        self.commit(status, None, Bytes::new())
    }

    fn ensure_open(&self) -> Result<(), WriteError> {
        if self.committed {
            return Err(WriteError::AlreadyCommitted(self.status));
        }
        Ok(())
    }

    fn commit(
        &mut self,
        status: StatusCode,
        content_type: Option<ContentType>,
        body: Bytes,
    ) -> Result<(), WriteError> {
        self.ensure_open()?;
        if let Some(ct) = content_type {
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
        }
        self.status = status;
        self.body = body;
        self.committed = true;
        self.values.status_code = status;
        Ok(())
    }

    /// Converts the collected response into the hyper wire type.
    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

/// A plain-text response written outside any handler chain.
pub(crate) fn plain(status: StatusCode, body: &'static str) -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status;
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(ContentType::Text.as_str()));
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_commit_records_status_in_values() {
        let mut w = ResponseWriter::new();
        w.respond_json(&serde_json::json!({ "id": 7 }), StatusCode::CREATED).unwrap();

        assert!(w.is_committed());
        assert_eq!(w.values().status_code, StatusCode::CREATED);

        let res = w.into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
    }

    #[test]
    fn second_commit_is_rejected_and_first_is_kept() {
        let mut w = ResponseWriter::new();
        w.text(StatusCode::ACCEPTED, "first").unwrap();

        let err = w.respond_status(StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert!(matches!(err, WriteError::AlreadyCommitted(StatusCode::ACCEPTED)));
        assert_eq!(w.values().status_code, StatusCode::ACCEPTED);
    }

    #[test]
    fn no_content_has_no_body_or_content_type() {
        let mut w = ResponseWriter::new();
        w.respond_json(&[1, 2, 3], StatusCode::NO_CONTENT).unwrap();

        let res = w.into_response();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(res.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn uncommitted_writer_defaults_to_ok() {
        let w = ResponseWriter::new();
        assert!(!w.is_committed());
        assert_eq!(w.into_response().status(), StatusCode::OK);
    }
}
