//! Client-level options, their merge rules, and per-request overrides.
//!
//! # Design
//! A client holds its options behind an `Arc`. Every request captures the
//! snapshot current at construction, and `merged` always builds a fresh
//! value, so `update_options` never reaches requests already built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::picker::{ContextPicker, ContextPickerConfig};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::stats::StatsCollector;
use crate::types::{Context, Params};

pub const DEFAULT_BASE_PATH: &str = "/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Everything a custom GET URI builder may look at.
#[derive(Debug)]
pub struct UriContext<'a> {
    pub base_path: &'a str,
    pub resource: &'a str,
    pub params: &'a Params,
    pub config: &'a RequestConfig,
    /// Context already narrowed by the GET picker.
    pub context: &'a Context,
}

/// Returns `None` to fall back to the default URI.
pub type GetUriBuilder = Arc<dyn Fn(&UriContext<'_>) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct ClientOptions {
    pub base_path: String,
    pub timeout: Duration,
    pub cors_base_path: Option<String>,
    pub context: Context,
    pub context_picker: ContextPicker,
    /// `None` disables retries.
    pub retry: Option<RetryPolicy>,
    pub allow_unsafe_retry: bool,
    pub headers: BTreeMap<String, String>,
    pub stats_collector: Option<StatsCollector>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            cors_base_path: None,
            context: Context::new(),
            context_picker: ContextPicker::default(),
            retry: None,
            allow_unsafe_retry: false,
            headers: BTreeMap::new(),
            stats_collector: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .field("cors_base_path", &self.cors_base_path)
            .field("context", &self.context)
            .field("context_picker", &self.context_picker)
            .field("retry", &self.retry)
            .field("allow_unsafe_retry", &self.allow_unsafe_retry)
            .field("headers", &self.headers)
            .field("stats_collector", &self.stats_collector.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl ClientOptions {
    /// Apply `patch` on top of these options.
    ///
    /// `context` and `headers` are shallow-merged, `context_picker` is merged
    /// per method, every other field present in the patch overwrites.
    pub fn merged(&self, patch: &OptionsPatch) -> ClientOptions {
        let mut next = self.clone();
        if let Some(base_path) = &patch.base_path {
            next.base_path = base_path.clone();
        }
        if let Some(timeout) = patch.timeout {
            next.timeout = timeout;
        }
        if let Some(cors_base_path) = &patch.cors_base_path {
            next.cors_base_path = Some(cors_base_path.clone());
        }
        if let Some(context) = &patch.context {
            next.context
                .extend(context.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        if let Some(picker) = &patch.context_picker {
            next.context_picker = self.context_picker.merged(picker);
        }
        if let Some(retry) = &patch.retry {
            next.retry = Some(retry.clone());
        }
        if let Some(allow) = patch.allow_unsafe_retry {
            next.allow_unsafe_retry = allow;
        }
        if let Some(headers) = &patch.headers {
            next.headers
                .extend(headers.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        if let Some(collector) = &patch.stats_collector {
            next.stats_collector = Some(collector.clone());
        }
        next
    }
}

/// Argument of `CrudClient::update_options`. Absent fields leave the
/// current value alone.
#[derive(Clone, Default)]
pub struct OptionsPatch {
    pub base_path: Option<String>,
    pub timeout: Option<Duration>,
    pub cors_base_path: Option<String>,
    pub context: Option<Context>,
    pub context_picker: Option<ContextPicker>,
    pub retry: Option<RetryPolicy>,
    pub allow_unsafe_retry: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    pub stats_collector: Option<StatsCollector>,
}

/// Deserializable client configuration, e.g. loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub cors_base_path: Option<String>,
    pub context: Context,
    pub context_picker: ContextPickerConfig,
    pub retry: Option<RetryConfig>,
    pub allow_unsafe_retry: bool,
    pub headers: BTreeMap<String, String>,
}

impl From<ClientConfig> for ClientOptions {
    fn from(config: ClientConfig) -> Self {
        let defaults = ClientOptions::default();
        Self {
            base_path: config.base_path.unwrap_or(defaults.base_path),
            timeout: config.timeout_ms.map(Duration::from_millis).unwrap_or(defaults.timeout),
            cors_base_path: config.cors_base_path,
            context: config.context,
            context_picker: config.context_picker.into(),
            retry: config.retry.map(RetryPolicy::from),
            allow_unsafe_retry: config.allow_unsafe_retry,
            headers: config.headers,
            stats_collector: None,
        }
    }
}

/// Per-call overrides.
#[derive(Clone, Default)]
pub struct RequestConfig {
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
    pub retry: Option<RetryPolicy>,
    /// Overrides the client's `allow_unsafe_retry` for this call.
    pub unsafe_allow_retry: Option<bool>,
    /// Target `cors_base_path` instead of `base_path`.
    pub cors: bool,
    pub with_credentials: bool,
    pub construct_get_uri: Option<GetUriBuilder>,
    /// Free-form values forwarded as the POST `config` field.
    pub extra: Option<Value>,
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("retry", &self.retry)
            .field("unsafe_allow_retry", &self.unsafe_allow_retry)
            .field("cors", &self.cors)
            .field("with_credentials", &self.with_credentials)
            .field("construct_get_uri", &self.construct_get_uri.as_ref().map(|_| "<fn>"))
            .field("extra", &self.extra)
            .finish()
    }
}
