//! Error types for the CRUD client.
//!
//! # Design
//! Two families. `ClientError` is construction-time misuse and is returned
//! synchronously from the builder. `FetchError` is every failure of a call
//! that was actually executed; it is a value, cloned to every awaiter of the
//! in-flight execution, and carries the closed `ErrorReason` taxonomy that
//! the retry scheduler inspects.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse, TransportError};

/// Why an executed call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    /// A response arrived with a non-2xx status.
    BadHttpStatus,
    /// A 2xx response whose body is not a success envelope.
    BadJson,
    /// The attempt exceeded its timeout budget.
    Timeout,
    /// The caller cancelled the call.
    Abort,
    /// Any other transport failure (network error, status 0).
    Unknown,
}

impl ErrorReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadHttpStatus => "BAD_HTTP_STATUS",
            Self::BadJson => "BAD_JSON",
            Self::Timeout => "TIMEOUT",
            Self::Abort => "ABORT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Misuse detected while building a request, before anything is sent.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The resource name was empty.
    #[error("resource name must not be empty")]
    InvalidResource,

    /// A network client needs absolute base paths to build request URLs.
    #[error("base path {base_path:?} is not an absolute URL")]
    RelativeBasePath { base_path: String },

    /// Params, body or config could not be converted to JSON.
    #[error("failed to serialize request {field}: {source}")]
    Serialize {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A normalized failure of an executed call.
#[derive(Debug, Clone, Error)]
#[error("{reason} (status {status_code}) for {url}: {message}")]
pub struct FetchError {
    pub reason: ErrorReason,
    /// HTTP status of the failed attempt, `0` when no response arrived.
    pub status_code: u16,
    pub message: String,
    /// Payload produced by the remote handler for the caller.
    pub output: Option<Value>,
    /// Out-of-band metadata; appended to the service meta ledger.
    pub meta: Option<Value>,
    /// Timeout budget of the failed attempt.
    pub timeout: Duration,
    pub url: String,
    pub raw_request: Option<HttpRequest>,
}

impl FetchError {
    fn for_request(reason: ErrorReason, status_code: u16, message: String, request: &HttpRequest) -> Self {
        Self {
            reason,
            status_code,
            message,
            output: None,
            meta: None,
            timeout: request.timeout,
            url: request.url.clone(),
            raw_request: Some(request.clone()),
        }
    }

    pub(crate) fn aborted(request: &HttpRequest) -> Self {
        Self::for_request(ErrorReason::Abort, 0, "request aborted".to_string(), request)
    }

    pub(crate) fn from_transport(error: TransportError, request: &HttpRequest) -> Self {
        match error {
            TransportError::Timeout => Self::for_request(
                ErrorReason::Timeout,
                0,
                format!("timed out after {}ms", request.timeout.as_millis()),
                request,
            ),
            TransportError::Network(message) => Self::for_request(ErrorReason::Unknown, 0, message, request),
        }
    }

    /// Classify a response that did not carry a usable success envelope.
    pub(crate) fn from_response(response: &HttpResponse, request: &HttpRequest) -> Self {
        if response.status == 0 {
            return Self::for_request(
                ErrorReason::Unknown,
                0,
                "transport reported status 0".to_string(),
                request,
            );
        }
        if response.is_success() {
            return Self::for_request(
                ErrorReason::BadJson,
                response.status,
                format!("response body is not a valid envelope: {}", response.body),
                request,
            );
        }

        // Either an error envelope or a success envelope whose handler chose a
        // non-2xx `meta.statusCode`; read the fields loosely to cover both.
        let mut error = Self::for_request(ErrorReason::BadHttpStatus, response.status, response.body.clone(), request);
        if let Ok(Value::Object(mut body)) = serde_json::from_str::<Value>(&response.body) {
            error.message = match body.remove("message") {
                Some(Value::String(message)) => message,
                _ => format!("request failed with status {}", response.status),
            };
            error.output = non_null(body.remove("output")).or_else(|| non_null(body.remove("data")));
            error.meta = non_null(body.remove("meta"));
        }
        error
    }
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn request() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: "/api/widgets".to_string(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_millis(3000),
            cors: false,
            with_credentials: false,
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn reason_serializes_to_wire_names() {
        let json = serde_json::to_value(ErrorReason::BadHttpStatus).unwrap();
        assert_eq!(json, "BAD_HTTP_STATUS");
        assert_eq!(ErrorReason::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn error_envelope_fields_are_lifted() {
        let body = r#"{"message":"nope","output":{"message":"Not found"},"statusCode":404,"meta":{"x":1}}"#;
        let err = FetchError::from_response(&response(404, body), &request());
        assert_eq!(err.reason, ErrorReason::BadHttpStatus);
        assert_eq!(err.status_code, 404);
        assert_eq!(err.message, "nope");
        assert_eq!(err.output.unwrap()["message"], "Not found");
        assert_eq!(err.meta.unwrap()["x"], 1);
        assert_eq!(err.url, "/api/widgets");
    }

    #[test]
    fn non_json_error_body_becomes_message() {
        let err = FetchError::from_response(&response(502, "bad gateway"), &request());
        assert_eq!(err.reason, ErrorReason::BadHttpStatus);
        assert_eq!(err.message, "bad gateway");
        assert!(err.output.is_none());
    }

    #[test]
    fn success_envelope_with_error_status_keeps_data_and_meta() {
        let body = r#"{"data":{"tombstone":true},"meta":{"statusCode":410,"trace":"t1"}}"#;
        let err = FetchError::from_response(&response(410, body), &request());
        assert_eq!(err.reason, ErrorReason::BadHttpStatus);
        assert_eq!(err.status_code, 410);
        assert_eq!(err.message, "request failed with status 410");
        assert_eq!(err.output.unwrap()["tombstone"], true);
        assert_eq!(err.meta.unwrap()["trace"], "t1");
    }

    #[test]
    fn success_status_with_garbage_is_bad_json() {
        let err = FetchError::from_response(&response(200, "<html>"), &request());
        assert_eq!(err.reason, ErrorReason::BadJson);
        assert_eq!(err.status_code, 200);
    }

    #[test]
    fn status_zero_is_unknown() {
        let err = FetchError::from_response(&response(0, ""), &request());
        assert_eq!(err.reason, ErrorReason::Unknown);
        assert_eq!(err.status_code, 0);
    }

    #[test]
    fn transport_timeout_keeps_budget() {
        let err = FetchError::from_transport(TransportError::Timeout, &request());
        assert_eq!(err.reason, ErrorReason::Timeout);
        assert_eq!(err.timeout, Duration::from_millis(3000));
        assert!(err.raw_request.is_some());
    }
}
