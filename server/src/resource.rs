//! The contract between the dispatcher and resource handlers.

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use thiserror::Error;
use unifetch_core::{Context, Operation, Params};

/// The incoming HTTP request a call arrived on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    /// Context values sent by the client. For GET calls context and params
    /// share the query string, so this holds the whole query.
    pub context: Context,
}

/// One decoded call, as handed to a `Resource`.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub resource: String,
    pub operation: Operation,
    pub params: Params,
    pub body: Option<Value>,
    /// Free-form per-call config from the client.
    pub config: Value,
    pub context: RequestContext,
}

impl ResourceRequest {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Successful handler result.
#[derive(Debug, Clone, Default)]
pub struct ResourceOutput {
    pub data: Value,
    /// `statusCode` overrides the HTTP status, `headers` are copied onto the
    /// response; the whole object is returned to the client.
    pub meta: Option<Value>,
}

impl ResourceOutput {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Failure reported by a handler. Only these fields reach the client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Defaults to 500 on the wire.
    pub status_code: Option<u16>,
    pub message: String,
    pub output: Option<Value>,
    pub meta: Option<Value>,
}

impl HandlerError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
            output: None,
            meta: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            output: None,
            meta: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn not_implemented(operation: Operation) -> Self {
        Self::new(501, format!("operation \"{operation}\" is not implemented"))
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

pub type HandlerResult = Result<ResourceOutput, HandlerError>;

/// A named data service. Operations a resource does not override answer
/// with 501.
#[async_trait]
pub trait Resource: Send + Sync {
    async fn create(&self, request: ResourceRequest) -> HandlerResult {
        Err(HandlerError::not_implemented(request.operation))
    }

    async fn read(&self, request: ResourceRequest) -> HandlerResult {
        Err(HandlerError::not_implemented(request.operation))
    }

    async fn update(&self, request: ResourceRequest) -> HandlerResult {
        Err(HandlerError::not_implemented(request.operation))
    }

    async fn delete(&self, request: ResourceRequest) -> HandlerResult {
        Err(HandlerError::not_implemented(request.operation))
    }
}

/// Route a decoded call to the matching handler method.
pub(crate) async fn invoke(resource: &dyn Resource, request: ResourceRequest) -> HandlerResult {
    match request.operation {
        Operation::Create => resource.create(request).await,
        Operation::Read => resource.read(request).await,
        Operation::Update => resource.update(request).await,
        Operation::Delete => resource.delete(request).await,
    }
}
