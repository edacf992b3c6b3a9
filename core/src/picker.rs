//! Per-method selection of which context entries travel with a request.
//!
//! # Design
//! A picker is either an allow-list of keys or a predicate. Merging two
//! allow-lists concatenates them; any other pairing lets the newer picker
//! win for that method. No picker for a method means the whole context is
//! sent.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::http::HttpMethod;
use crate::types::Context;

pub type PickerFn = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Picker {
    /// Ordered key names; duplicates are allowed and harmless.
    AllowList(Vec<String>),
    /// Called with `(key, value)` for every context entry.
    Predicate(PickerFn),
}

impl Picker {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(keys.into_iter().map(Into::into).collect())
    }

    pub fn predicate(f: impl Fn(&str, &Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    fn select(&self, context: &Context) -> Context {
        match self {
            Self::AllowList(keys) => keys
                .iter()
                .filter_map(|key| context.get(key).map(|value| (key.clone(), value.clone())))
                .collect(),
            Self::Predicate(f) => context
                .iter()
                .filter(|(key, value)| f(key, value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

impl fmt::Debug for Picker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowList(keys) => f.debug_tuple("AllowList").field(keys).finish(),
            Self::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextPicker {
    pub get: Option<Picker>,
    pub post: Option<Picker>,
}

impl ContextPicker {
    pub fn for_method(&self, method: HttpMethod) -> Option<&Picker> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
        }
    }

    /// The subset of `context` sent with a request of `method`.
    pub fn pick(&self, method: HttpMethod, context: &Context) -> Context {
        match self.for_method(method) {
            Some(picker) => picker.select(context),
            None => context.clone(),
        }
    }

    /// Combine with a newer picker without modifying either side.
    pub fn merged(&self, newer: &ContextPicker) -> ContextPicker {
        ContextPicker {
            get: merge_picker(self.get.as_ref(), newer.get.as_ref()),
            post: merge_picker(self.post.as_ref(), newer.post.as_ref()),
        }
    }
}

fn merge_picker(older: Option<&Picker>, newer: Option<&Picker>) -> Option<Picker> {
    match (older, newer) {
        (Some(Picker::AllowList(old)), Some(Picker::AllowList(new))) => {
            Some(Picker::AllowList(old.iter().chain(new).cloned().collect()))
        }
        (_, Some(newer)) => Some(newer.clone()),
        (older, None) => older.cloned(),
    }
}

/// Serializable allow-list form, keyed by HTTP method name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextPickerConfig {
    #[serde(rename = "GET", default)]
    pub get: Option<Vec<String>>,
    #[serde(rename = "POST", default)]
    pub post: Option<Vec<String>>,
}

impl From<ContextPickerConfig> for ContextPicker {
    fn from(config: ContextPickerConfig) -> Self {
        Self {
            get: config.get.map(Picker::AllowList),
            post: config.post.map(Picker::AllowList),
        }
    }
}
