//! One CRUD call: builder, single in-flight execution, retries, abort.
//!
//! # Design
//! `Request` is a by-value builder. `send` consumes it and returns an
//! `InFlight` handle wrapping a memoized shared future, so however many
//! times the handle is awaited (or cloned and awaited) the transport sees a
//! single execution. The execution runs lazily on first poll; an `abort`
//! issued before that is remembered and the call resolves to `ABORT`
//! without touching the transport.

use std::future::IntoFuture;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{ClientError, ErrorReason, FetchError};
use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::normalize::{normalize, CallParts};
use crate::options::{ClientOptions, RequestConfig};
use crate::retry::retry_eligible;
use crate::stats::{record_outcome, CallInfo, ServiceMeta};
use crate::types::{Operation, Params, Response};
use crate::wire::SuccessEnvelope;

pub type CallResult = Result<Response, FetchError>;

/// A CRUD call being assembled.
pub struct Request {
    resource: String,
    operation: Operation,
    params: Params,
    body: Option<Value>,
    config: RequestConfig,
    options: Arc<ClientOptions>,
    transport: Arc<dyn Transport>,
    service_meta: ServiceMeta,
}

impl Request {
    pub(crate) fn new(
        operation: Operation,
        resource: &str,
        options: Arc<ClientOptions>,
        transport: Arc<dyn Transport>,
        service_meta: ServiceMeta,
    ) -> Result<Self, ClientError> {
        if resource.trim().is_empty() {
            return Err(ClientError::InvalidResource);
        }
        Ok(Self {
            resource: resource.to_string(),
            operation,
            params: Params::new(),
            body: None,
            config: RequestConfig::default(),
            options,
            transport,
            service_meta,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Replace the params.
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Add or overwrite a single param.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace the params with a serializable struct's fields.
    pub fn params_from<T: Serialize>(self, params: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(params)
            .map_err(|source| ClientError::Serialize { field: "params", source })?;
        let params = match value {
            Value::Object(map) => map,
            Value::Null => Params::new(),
            other => {
                return Err(ClientError::Serialize {
                    field: "params",
                    source: serde::ser::Error::custom(format!("params must be an object, got {other}")),
                })
            }
        };
        Ok(self.params(params))
    }

    /// Payload for `create` and `update`; ignored by other operations.
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn body_from<T: Serialize>(self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|source| ClientError::Serialize { field: "body", source })?;
        Ok(self.body(value))
    }

    pub fn client_config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }

    /// The HTTP request this call would send.
    pub fn http_request(&self) -> Result<HttpRequest, ClientError> {
        normalize(&self.parts(), &self.options)
    }

    fn parts(&self) -> CallParts<'_> {
        CallParts {
            resource: &self.resource,
            operation: self.operation,
            params: &self.params,
            body: self.body.as_ref(),
            config: &self.config,
        }
    }

    /// Start (lazily) the execution and hand back its shared handle.
    pub fn send(self) -> InFlight {
        let token = CancellationToken::new();
        let span = info_span!(
            "crud_call",
            resource = %self.resource,
            operation = %self.operation,
        );
        let future = run(self, token.clone()).instrument(span).boxed().shared();
        InFlight { future, token }
    }

    pub async fn execute(self) -> CallResult {
        self.send().await
    }

    /// Callback adapter: `callback` is invoked exactly once with the outcome.
    pub async fn end<F>(self, callback: F)
    where
        F: FnOnce(CallResult),
    {
        callback(self.execute().await);
    }

    /// Execute and discard the outcome.
    #[deprecated(note = "pass a callback to `end` or await `execute`")]
    pub async fn end_without_callback(self) {
        warn!(
            resource = %self.resource,
            operation = %self.operation,
            "end() called without a callback; the outcome is discarded"
        );
        let _ = self.execute().await;
    }
}

impl IntoFuture for Request {
    type Output = CallResult;
    type IntoFuture = Shared<BoxFuture<'static, CallResult>>;

    fn into_future(self) -> Self::IntoFuture {
        self.send().future
    }
}

/// Handle over the single execution of a sent `Request`.
#[derive(Clone)]
pub struct InFlight {
    future: Shared<BoxFuture<'static, CallResult>>,
    token: CancellationToken,
}

impl InFlight {
    /// Await the outcome. Every call observes the same result.
    pub async fn result(&self) -> CallResult {
        self.future.clone().await
    }

    /// Cancel the current attempt and suppress any pending retry.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl IntoFuture for InFlight {
    type Output = CallResult;
    type IntoFuture = Shared<BoxFuture<'static, CallResult>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

async fn run(request: Request, token: CancellationToken) -> CallResult {
    let started = Instant::now();
    let result = match request.http_request() {
        Ok(http_request) => attempt_loop(&request, http_request, &token).await,
        Err(error) => Err(FetchError {
            reason: ErrorReason::Unknown,
            status_code: 0,
            message: error.to_string(),
            output: None,
            meta: None,
            timeout: request.config.timeout.unwrap_or(request.options.timeout),
            url: String::new(),
            raw_request: None,
        }),
    };

    let call = CallInfo {
        resource: &request.resource,
        operation: request.operation,
        params: &request.params,
    };
    record_outcome(
        &call,
        &result,
        started.elapsed(),
        &request.service_meta,
        request.options.stats_collector.as_ref(),
    );
    result
}

async fn attempt_loop(request: &Request, http_request: HttpRequest, token: &CancellationToken) -> CallResult {
    let policy = request.config.retry.as_ref().or(request.options.retry.as_ref());
    let allow_unsafe = request
        .config
        .unsafe_allow_retry
        .unwrap_or(request.options.allow_unsafe_retry);
    let policy = policy.filter(|_| retry_eligible(request.operation, allow_unsafe));

    let mut attempt = 0_u32;
    loop {
        debug!(attempt, method = http_request.method.as_str(), url = %http_request.url, "sending request");
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::aborted(&http_request)),
            outcome = tokio::time::timeout(http_request.timeout, request.transport.send(http_request.clone())) => outcome,
        };

        let error = match outcome {
            Ok(Ok(response)) => match parse_success(&response) {
                Some(success) => return Ok(success),
                None => FetchError::from_response(&response, &http_request),
            },
            Ok(Err(transport_error)) => FetchError::from_transport(transport_error, &http_request),
            Err(_elapsed) => FetchError::from_transport(TransportError::Timeout, &http_request),
        };

        let Some(policy) = policy.filter(|policy| policy.should_retry(attempt, &error)) else {
            return Err(error);
        };
        attempt += 1;
        let delay = policy.delay(attempt);
        warn!(
            attempt,
            max_retries = policy.configured_max_retries(),
            delay_ms = delay.as_millis() as u64,
            reason = %error.reason,
            status = error.status_code,
            "retrying request"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::aborted(&http_request)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn parse_success(response: &HttpResponse) -> Option<Response> {
    if !response.is_success() {
        return None;
    }
    let envelope: SuccessEnvelope = serde_json::from_str(&response.body).ok()?;
    Some(Response {
        data: envelope.data,
        meta: envelope.meta,
    })
}
