//! HTTP surface of the dispatcher.
//!
//! # Design
//! Two routes per resource: `GET /{resource};{params}?{context}` decodes a
//! `read` whose params are JSON-valued matrix segments and whose query is the
//! request context, `POST /{resource}` decodes any operation from a
//! `PostPayload`. Both converge on `dispatch`, which looks the handler up,
//! runs the optional params processor, invokes the handler and writes the
//! success or error envelope through the optional response formatter.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::{debug, warn};
use url::form_urlencoded;
use unifetch_core::wire::{ErrorEnvelope, PostPayload, SuccessEnvelope};
use unifetch_core::{Operation, Params};

use crate::registry::Registry;
use crate::resource::{invoke, HandlerError, RequestContext, ResourceRequest};

/// What a params processor learns about the call.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub resource: String,
    pub operation: Operation,
}

/// What a response formatter learns about the outcome.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub resource: String,
    pub operation: Operation,
    pub status_code: u16,
}

pub type ParamsProcessor = Arc<dyn Fn(&RequestContext, &OperationInfo, Params) -> Params + Send + Sync>;
pub type ResponseFormatter = Arc<dyn Fn(&RequestContext, &ResponseContext, Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct DispatcherOptions {
    pub params_processor: Option<ParamsProcessor>,
    /// Applied to the serialized envelope, success or error.
    pub response_formatter: Option<ResponseFormatter>,
}

impl fmt::Debug for DispatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherOptions")
            .field("params_processor", &self.params_processor.is_some())
            .field("response_formatter", &self.response_formatter.is_some())
            .finish()
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    options: Arc<DispatcherOptions>,
}

/// Router serving every registered resource at `/{resource}`.
pub fn app(registry: Registry, options: DispatcherOptions) -> Router {
    let state = AppState {
        registry: Arc::new(registry),
        options: Arc::new(options),
    };
    Router::new()
        .route("/{resource}", get(handle_get).post(handle_post))
        .with_state(state)
}

/// `app` mounted under `base_path`, e.g. `/api`.
pub fn app_at(base_path: &str, registry: Registry, options: DispatcherOptions) -> Router {
    let base_path = base_path.trim_end_matches('/');
    if base_path.is_empty() {
        return app(registry, options);
    }
    Router::new().nest(base_path, app(registry, options))
}

async fn handle_get(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    // The decoded `Path` would unescape `;` inside values, so split the raw
    // segment instead.
    let segment = uri.path().rsplit('/').next().unwrap_or_default();
    let (resource, matrix) = segment.split_once(';').unwrap_or((segment, ""));
    let resource = resource.to_string();
    let params = matrix_params(matrix);
    let context = RequestContext {
        method,
        uri: uri.to_string(),
        headers,
        context: query.into_iter().map(|(key, value)| (key, Value::String(value))).collect(),
    };
    let call = Call {
        resource,
        operation: Operation::Read,
        params,
        body: None,
        config: Value::Null,
    };
    dispatch(&state, context, call).await
}

async fn handle_post(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: PostPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%resource, %error, "rejecting malformed request body");
            return error_response(HandlerError::bad_request(format!("invalid request body: {error}")));
        }
    };
    let context = RequestContext {
        method,
        uri: uri.to_string(),
        headers,
        context: payload.context,
    };
    let call = Call {
        resource,
        operation: payload.operation,
        params: payload.params,
        body: payload.body,
        config: payload.config,
    };
    dispatch(&state, context, call).await
}

/// `key=value` pairs separated by `;`. Values are JSON; one that does not
/// parse (a hand-written `id=abc`) is kept as a string.
fn matrix_params(matrix: &str) -> Params {
    matrix
        .split(';')
        .filter(|pair| !pair.is_empty())
        .flat_map(|pair| form_urlencoded::parse(pair.as_bytes()))
        .map(|(key, value)| {
            let value = serde_json::from_str(&value).unwrap_or_else(|_| Value::String(value.into_owned()));
            (key.into_owned(), value)
        })
        .collect()
}

struct Call {
    resource: String,
    operation: Operation,
    params: Params,
    body: Option<Value>,
    config: Value,
}

async fn dispatch(state: &AppState, context: RequestContext, call: Call) -> Response {
    let Some(handler) = state.registry.get(&call.resource) else {
        warn!(resource = %call.resource, "unknown resource");
        return error_response(HandlerError::bad_request(format!(
            "resource \"{}\" is not registered",
            call.resource
        )));
    };

    let info = OperationInfo {
        resource: call.resource.clone(),
        operation: call.operation,
    };
    let params = match &state.options.params_processor {
        Some(processor) => processor(&context, &info, call.params),
        None => call.params,
    };
    debug!(resource = %info.resource, operation = %info.operation, "dispatching");

    let request = ResourceRequest {
        resource: call.resource,
        operation: call.operation,
        params,
        body: call.body,
        config: call.config,
        context: context.clone(),
    };

    let (status_code, headers, envelope) = match invoke(handler.as_ref(), request).await {
        Ok(output) => {
            let status_code = output
                .meta
                .as_ref()
                .and_then(|meta| meta.get("statusCode"))
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(200);
            let headers = meta_headers(output.meta.as_ref());
            let envelope = SuccessEnvelope {
                data: output.data,
                meta: output.meta,
            };
            (status_code, headers, to_value(&envelope))
        }
        Err(error) => {
            warn!(
                resource = %info.resource,
                operation = %info.operation,
                status = error.status_code.unwrap_or(500),
                %error,
                "handler failed"
            );
            let status_code = error.status_code.unwrap_or(500);
            (status_code, HeaderMap::new(), to_value(&error_envelope(error)))
        }
    };

    let body = match &state.options.response_formatter {
        Some(formatter) => {
            let response_context = ResponseContext {
                resource: info.resource,
                operation: info.operation,
                status_code,
            };
            formatter(&context, &response_context, envelope)
        }
        None => envelope,
    };

    (status(status_code), headers, Json(body)).into_response()
}

fn error_envelope(error: HandlerError) -> ErrorEnvelope {
    ErrorEnvelope {
        message: Some(error.message),
        output: error.output,
        status_code: error.status_code.unwrap_or(500),
        meta: error.meta,
    }
}

fn error_response(error: HandlerError) -> Response {
    let status_code = error.status_code.unwrap_or(500);
    (status(status_code), Json(error_envelope(error))).into_response()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn to_value<T: serde::Serialize>(envelope: &T) -> Value {
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// String entries of `meta.headers`; invalid names or values are skipped.
fn meta_headers(meta: Option<&Value>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(entries) = meta.and_then(|meta| meta.get("headers")).and_then(Value::as_object) else {
        return headers;
    };
    for (name, value) in entries {
        let Some(value) = value.as_str() else { continue };
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_headers_keep_valid_string_entries() {
        let meta = json!({"headers": {"cache-control": "max-age=60", "bad header": "x", "n": 1}});
        let headers = meta_headers(Some(&meta));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["cache-control"], "max-age=60");
    }

    #[test]
    fn error_envelope_defaults_to_500() {
        let envelope = error_envelope(HandlerError::internal("boom"));
        assert_eq!(envelope.status_code, 500);
        assert_eq!(envelope.message.as_deref(), Some("boom"));
    }

    #[test]
    fn matrix_params_decode_json_values() {
        let params = matrix_params("id=42;flag=true;name=%22a+b%22;tags=%5B1%2C2%5D;raw=abc");
        assert_eq!(
            Value::Object(params),
            json!({"id": 42, "flag": true, "name": "a b", "tags": [1, 2], "raw": "abc"})
        );
    }

    #[test]
    fn matrix_params_keep_quoted_numbers_as_strings() {
        let params = matrix_params("id=%2242%22");
        assert_eq!(params["id"], json!("42"));
        assert!(matrix_params("").is_empty());
    }

    #[test]
    fn out_of_range_status_falls_back_to_500() {
        assert_eq!(status(99), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(201), StatusCode::CREATED);
    }
}
