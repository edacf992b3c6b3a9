//! JSON envelopes exchanged between the client and the dispatcher.
//!
//! - `GET {base}/{resource};{key}={json}...?{context}` for `read`; no body.
//! - `POST {base}/{resource}` with a `PostPayload` for everything else.
//! - Success: `SuccessEnvelope`, status 200 unless `meta.statusCode` says
//!   otherwise.
//! - Failure: `ErrorEnvelope`, status 500 unless the handler set one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Context, Operation, Params};

/// Header naming the CRUD operation on POST requests, mirroring the body.
pub const OPERATION_HEADER: &str = "x-crud-operation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPayload {
    /// Mirrors the path segment; the path is authoritative.
    #[serde(default)]
    pub resource: String,
    pub operation: Operation,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
    #[serde(default)]
    pub context: Context,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}
