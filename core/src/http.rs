//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. The normalizer produces an
//! `HttpRequest`, a `Transport` implementation performs the round-trip, and
//! the core interprets the `HttpResponse`. Only the transport touches the
//! network, so the core can be driven by a scripted transport in tests or by
//! an in-process one on the server.
//!
//! Cancellation is expressed by dropping the future returned from
//! `Transport::send`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method for a request. Non-read operations travel over POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Budget for this single attempt.
    pub timeout: Duration,
    /// The request targets the CORS base path.
    pub cors: bool,
    pub with_credentials: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// A status of `0` means the transport could not obtain a response at all.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

/// Performs one HTTP round-trip.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
