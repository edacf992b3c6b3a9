//! Server side of the CRUD protocol.
//!
//! # Overview
//! A `Registry` maps resource names to `Resource` handlers; `app` turns it
//! into an axum router speaking the same wire envelopes the client sends.
//! `LocalTransport` plugs that router straight into `CrudClient`, so server
//! code and remote clients share one API and one set of handlers.

pub mod config;
pub mod dispatch;
pub mod local;
pub mod registry;
pub mod resource;
pub mod todos;

use axum::Router;
use tokio::net::TcpListener;

pub use config::ServerConfig;
pub use dispatch::{app, app_at, DispatcherOptions, OperationInfo, ParamsProcessor, ResponseContext, ResponseFormatter};
pub use local::LocalTransport;
pub use registry::Registry;
pub use resource::{HandlerError, HandlerResult, RequestContext, Resource, ResourceOutput, ResourceRequest};
pub use todos::{Todo, TodoResource};

pub async fn run(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}
