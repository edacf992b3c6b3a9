//! In-process `Transport`: drives the dispatcher router directly, so server
//! code can call its own resources through `CrudClient`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use unifetch_core::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Clone)]
pub struct LocalTransport {
    router: Router,
}

impl LocalTransport {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        let mut builder = Request::builder().method(method).uri(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Body::from(request.body.unwrap_or_default()))
            .map_err(|error| TransportError::Network(error.to_string()))?;

        let response = match self.router.clone().oneshot(http_request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?
            .to_bytes();

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}
