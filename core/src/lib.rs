//! Universal CRUD data-access client.
//!
//! # Overview
//! Application code issues `create|read|update|delete` calls against a named
//! resource; the client turns each into one HTTP request against a
//! dispatcher that routes it to the resource's handler.
//!
//! # Design
//! - `CrudClient` holds an immutable options snapshot, a `Transport`, and
//!   the session's service meta ledger.
//! - `Request` is a by-value builder; `send` yields a memoized `InFlight`
//!   execution that retries eligible failures with full-jitter backoff and
//!   can be aborted.
//! - `normalize` is the only place that knows the wire layout; `wire` holds
//!   the envelopes the dispatcher speaks too.
//! - I/O lives behind `Transport`. `ReqwestTransport` is the network
//!   default; tests and in-process callers provide their own.

pub mod client;
pub mod error;
pub mod http;
pub mod normalize;
pub mod options;
pub mod picker;
pub mod request;
pub mod retry;
pub mod stats;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::CrudClient;
pub use error::{ClientError, ErrorReason, FetchError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use options::{ClientConfig, ClientOptions, GetUriBuilder, OptionsPatch, RequestConfig, UriContext};
pub use picker::{ContextPicker, Picker};
pub use request::{CallResult, InFlight, Request};
pub use retry::{Jitter, RetryPolicy};
pub use stats::{ServiceMeta, Stats, StatsCollector};
pub use transport::ReqwestTransport;
pub use types::{Context, Operation, Params, Response};
