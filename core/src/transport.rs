//! The seam where the host performs I/O.
//!
//! Providers hand a built `HttpRequest` to a `Transport` and parse whatever
//! comes back. Non-success statuses are returned as responses, not errors;
//! interpreting them is the core's job. No retries happen on either side of
//! this trait.

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

pub trait Transport {
    /// Execute one request. Returns `ApiError::Transport` only when no
    /// response was received.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<F> Transport for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, ApiError>,
{
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self(request)
    }
}
