//! Session-scoped entry point for CRUD calls.
//!
//! # Design
//! `CrudClient` owns an options snapshot (`Arc<ClientOptions>`), the
//! transport, and the service meta ledger. Each CRUD method builds a fresh
//! `Request` that captures the snapshot current at that moment; clones of
//! the client share the ledger.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::ClientError;
use crate::http::Transport;
use crate::options::{ClientOptions, OptionsPatch};
use crate::request::Request;
use crate::stats::ServiceMeta;
use crate::transport::ReqwestTransport;
use crate::types::Operation;

#[derive(Clone)]
pub struct CrudClient {
    options: Arc<ClientOptions>,
    transport: Arc<dyn Transport>,
    service_meta: ServiceMeta,
}

impl CrudClient {
    pub fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            options: Arc::new(options),
            transport,
            service_meta: ServiceMeta::default(),
        }
    }

    /// Client over the network, using `reqwest`.
    ///
    /// `base_path` (and `cors_base_path`, when set) must be absolute URLs
    /// such as `http://localhost:3000/api`; the `/api` default only suits
    /// transports that resolve paths themselves.
    pub fn over_http(options: ClientOptions) -> Result<Self, ClientError> {
        let bases = std::iter::once(&options.base_path).chain(options.cors_base_path.as_ref());
        for base_path in bases {
            if Url::parse(base_path).is_err() {
                return Err(ClientError::RelativeBasePath {
                    base_path: base_path.clone(),
                });
            }
        }
        Ok(Self::new(options, Arc::new(ReqwestTransport::new())))
    }

    pub fn request(&self, operation: Operation, resource: &str) -> Result<Request, ClientError> {
        Request::new(
            operation,
            resource,
            Arc::clone(&self.options),
            Arc::clone(&self.transport),
            self.service_meta.clone(),
        )
    }

    pub fn create(&self, resource: &str) -> Result<Request, ClientError> {
        self.request(Operation::Create, resource)
    }

    pub fn read(&self, resource: &str) -> Result<Request, ClientError> {
        self.request(Operation::Read, resource)
    }

    pub fn update(&self, resource: &str) -> Result<Request, ClientError> {
        self.request(Operation::Update, resource)
    }

    pub fn delete(&self, resource: &str) -> Result<Request, ClientError> {
        self.request(Operation::Delete, resource)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Merge `patch` into a new options snapshot. Requests already built
    /// keep the snapshot they captured.
    pub fn update_options(&mut self, patch: &OptionsPatch) {
        self.options = Arc::new(self.options.merged(patch));
    }

    /// Metadata of every completed call, in completion order.
    pub fn service_meta(&self) -> Vec<Value> {
        self.service_meta.snapshot()
    }
}
