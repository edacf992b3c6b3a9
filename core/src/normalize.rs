//! Turns a CRUD call plus client options into an `HttpRequest`.
//!
//! # Design
//! `read` is a GET, so responses stay cacheable. Params ride as matrix
//! segments on the resource (`widgets;id=42;name=%22x%22`) with JSON values,
//! which keeps their types; the query string carries only the GET-picked
//! context. Every other operation is a POST to
//! the same path with a JSON `PostPayload`; the operation travels in the
//! body (and is mirrored in a header) rather than in the HTTP verb, so
//! proxies that refuse PUT/DELETE do not get in the way.

use std::collections::BTreeMap;

use serde_json::Value;
use url::form_urlencoded;

use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest};
use crate::options::{ClientOptions, RequestConfig, UriContext};
use crate::types::{Context, Operation, Params};
use crate::wire::{PostPayload, OPERATION_HEADER};

/// Everything the normalizer needs to know about one call.
#[derive(Debug)]
pub struct CallParts<'a> {
    pub resource: &'a str,
    pub operation: Operation,
    pub params: &'a Params,
    pub body: Option<&'a Value>,
    pub config: &'a RequestConfig,
}

pub fn normalize(call: &CallParts<'_>, options: &ClientOptions) -> Result<HttpRequest, ClientError> {
    let base = resolve_base(call.config, options);
    let method = if call.operation == Operation::Read {
        HttpMethod::Get
    } else {
        HttpMethod::Post
    };
    let context = options.context_picker.pick(method, &options.context);
    let mut headers = merge_headers(call.config, options);

    let (url, body) = match method {
        HttpMethod::Get => (get_url(base, call, &context), None),
        HttpMethod::Post => {
            let payload = PostPayload {
                resource: call.resource.to_string(),
                operation: call.operation,
                params: call.params.clone(),
                body: call.body.filter(|_| call.operation.accepts_body()).cloned(),
                config: call.config.extra.clone().unwrap_or(Value::Null),
                context,
            };
            let body = serde_json::to_string(&payload)
                .map_err(|source| ClientError::Serialize { field: "payload", source })?;
            headers.push(("content-type".to_string(), "application/json".to_string()));
            headers.push((OPERATION_HEADER.to_string(), call.operation.as_str().to_string()));
            (format!("{base}/{}", call.resource), Some(body))
        }
    };

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
        timeout: call.config.timeout.unwrap_or(options.timeout),
        cors: call.config.cors,
        with_credentials: call.config.with_credentials,
    })
}

fn resolve_base<'a>(config: &RequestConfig, options: &'a ClientOptions) -> &'a str {
    let base = match (&options.cors_base_path, config.cors) {
        (Some(cors_base), true) => cors_base.as_str(),
        _ => options.base_path.as_str(),
    };
    base.trim_end_matches('/')
}

fn get_url(base: &str, call: &CallParts<'_>, context: &Context) -> String {
    if let Some(builder) = &call.config.construct_get_uri {
        let uri_context = UriContext {
            base_path: base,
            resource: call.resource,
            params: call.params,
            config: call.config,
            context,
        };
        if let Some(uri) = builder(&uri_context) {
            return uri;
        }
    }

    let mut url = format!("{base}/{}", call.resource);
    let params: BTreeMap<&str, &Value> = call.params.iter().map(|(k, v)| (k.as_str(), v)).collect();
    for (key, value) in params {
        url.push(';');
        url.extend(form_urlencoded::byte_serialize(key.as_bytes()));
        url.push('=');
        url.extend(form_urlencoded::byte_serialize(value.to_string().as_bytes()));
    }

    if context.is_empty() {
        return url;
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in context {
        serializer.append_pair(key, &context_value(value));
    }
    format!("{url}?{}", serializer.finish())
}

fn context_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Client headers, then per-request headers, then the XHR marker unless the
/// request is cross-origin.
fn merge_headers(config: &RequestConfig, options: &ClientOptions) -> Vec<(String, String)> {
    let mut merged = options.headers.clone();
    merged.extend(config.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !config.cors {
        merged
            .entry("x-requested-with".to_string())
            .or_insert_with(|| "XMLHttpRequest".to_string());
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    fn build(operation: Operation, params: &Params, body: Option<&Value>, config: &RequestConfig, options: &ClientOptions) -> HttpRequest {
        let call = CallParts {
            resource: "widgets",
            operation,
            params,
            body,
            config,
        };
        normalize(&call, options).unwrap()
    }

    #[test]
    fn read_becomes_get_with_query() {
        let p = params(json!({"id": 42}));
        let req = build(Operation::Read, &p, None, &RequestConfig::default(), &ClientOptions::default());
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "/api/widgets;id=42");
        assert!(req.body.is_none());
        assert_eq!(req.timeout, Duration::from_millis(3000));
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
    }

    #[test]
    fn read_without_params_has_no_query() {
        let req = build(Operation::Read, &Params::new(), None, &RequestConfig::default(), &ClientOptions::default());
        assert_eq!(req.url, "/api/widgets");
    }

    #[test]
    fn get_keeps_params_in_matrix_and_picked_context_in_query() {
        let mut options = ClientOptions::default();
        options.context = params(json!({"lang": "en", "id": "ctx", "secret": "s"}));
        options.context_picker.get = Some(crate::picker::Picker::keys(["lang", "id"]));
        let p = params(json!({"id": 7, "q": "a b"}));
        let req = build(Operation::Read, &p, None, &RequestConfig::default(), &options);
        assert_eq!(req.url, "/api/widgets;id=7;q=%22a+b%22?id=ctx&lang=en");
    }

    #[test]
    fn matrix_values_keep_their_json_type() {
        let numeric = build(Operation::Read, &params(json!({"id": 42, "on": true})), None, &RequestConfig::default(), &ClientOptions::default());
        let textual = build(Operation::Read, &params(json!({"id": "42", "on": "true"})), None, &RequestConfig::default(), &ClientOptions::default());
        assert_eq!(numeric.url, "/api/widgets;id=42;on=true");
        assert_eq!(textual.url, "/api/widgets;id=%2242%22;on=%22true%22");
    }

    #[test]
    fn matrix_separators_inside_params_are_escaped() {
        let p = params(json!({"a;b": "x=y/z", "tags": ["red", "blue"]}));
        let req = build(Operation::Read, &p, None, &RequestConfig::default(), &ClientOptions::default());
        assert_eq!(
            req.url,
            "/api/widgets;a%3Bb=%22x%3Dy%2Fz%22;tags=%5B%22red%22%2C%22blue%22%5D"
        );
    }

    #[test]
    fn create_posts_payload_with_context() {
        let mut options = ClientOptions::default();
        options.context = params(json!({"lang": "en"}));
        let body = json!({"name": "y"});
        let req = build(Operation::Create, &Params::new(), Some(&body), &RequestConfig::default(), &options);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "/api/widgets");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header(OPERATION_HEADER), Some("create"));
        let payload: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["operation"], "create");
        assert_eq!(payload["resource"], "widgets");
        assert_eq!(payload["body"]["name"], "y");
        assert_eq!(payload["context"]["lang"], "en");
    }

    #[test]
    fn delete_drops_body_and_honors_post_picker() {
        let mut options = ClientOptions::default();
        options.context = params(json!({"lang": "en", "device": "phone"}));
        options.context_picker.post = Some(crate::picker::Picker::keys(["device"]));
        let body = json!({"ignored": true});
        let p = params(json!({"id": 1}));
        let req = build(Operation::Delete, &p, Some(&body), &RequestConfig::default(), &options);
        let payload: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["operation"], "delete");
        assert!(payload.get("body").is_none());
        assert_eq!(payload["params"]["id"], 1);
        assert_eq!(payload["context"], json!({"device": "phone"}));
    }

    #[test]
    fn request_headers_override_client_headers() {
        let mut options = ClientOptions::default();
        options.headers.insert("x-app".to_string(), "client".to_string());
        options.headers.insert("x-keep".to_string(), "1".to_string());
        let mut config = RequestConfig::default();
        config.headers.insert("x-app".to_string(), "request".to_string());
        config.timeout = Some(Duration::from_millis(50));
        let req = build(Operation::Read, &Params::new(), None, &config, &options);
        assert_eq!(req.header("x-app"), Some("request"));
        assert_eq!(req.header("x-keep"), Some("1"));
        assert_eq!(req.timeout, Duration::from_millis(50));
    }

    #[test]
    fn cors_uses_absolute_base_and_drops_xhr_marker() {
        let mut options = ClientOptions::default();
        options.cors_base_path = Some("https://data.example.com/api/".to_string());
        let config = RequestConfig {
            cors: true,
            with_credentials: true,
            ..RequestConfig::default()
        };
        let req = build(Operation::Read, &Params::new(), None, &config, &options);
        assert_eq!(req.url, "https://data.example.com/api/widgets");
        assert!(req.cors);
        assert!(req.with_credentials);
        assert!(req.header("x-requested-with").is_none());
    }

    #[test]
    fn cors_without_cors_base_keeps_relative_base() {
        let config = RequestConfig {
            cors: true,
            ..RequestConfig::default()
        };
        let req = build(Operation::Read, &Params::new(), None, &config, &ClientOptions::default());
        assert_eq!(req.url, "/api/widgets");
    }

    #[test]
    fn custom_uri_builder_sees_explicit_context() {
        let mut options = ClientOptions::default();
        options.context = params(json!({"lang": "de"}));
        let config = RequestConfig {
            construct_get_uri: Some(Arc::new(|uri: &UriContext<'_>| {
                Some(format!(
                    "{}/{};lang={}",
                    uri.base_path,
                    uri.resource,
                    uri.context["lang"].as_str().unwrap_or_default()
                ))
            })),
            ..RequestConfig::default()
        };
        let req = build(Operation::Read, &Params::new(), None, &config, &options);
        assert_eq!(req.url, "/api/widgets;lang=de");
    }

    #[test]
    fn custom_uri_builder_can_decline() {
        let config = RequestConfig {
            construct_get_uri: Some(Arc::new(|_: &UriContext<'_>| None)),
            ..RequestConfig::default()
        };
        let p = params(json!({"id": 1}));
        let req = build(Operation::Read, &p, None, &config, &ClientOptions::default());
        assert_eq!(req.url, "/api/widgets;id=1");
    }
}
