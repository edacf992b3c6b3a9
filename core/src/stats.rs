//! Per-call metadata ledger and stats reporting.
//!
//! `record_outcome` runs once per terminal outcome of a call, never for
//! intermediate retry failures.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;
use crate::types::{Operation, Params, Response};

/// Reported to the stats collector when a call completes.
#[derive(Debug, Clone)]
pub struct Stats {
    pub resource: String,
    pub operation: Operation,
    pub params: Params,
    /// `200` on success.
    pub status_code: u16,
    pub err: Option<FetchError>,
    /// Measured from the first send, so retries inflate it.
    pub time: Duration,
}

pub type StatsCollector = Arc<dyn Fn(&Stats) + Send + Sync>;

/// Append-only, completion-ordered metadata shared by a client and every
/// request it builds.
#[derive(Clone, Default)]
pub struct ServiceMeta {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl ServiceMeta {
    pub fn push(&self, meta: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(meta);
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ServiceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMeta").field("len", &self.len()).finish()
    }
}

pub(crate) struct CallInfo<'a> {
    pub resource: &'a str,
    pub operation: Operation,
    pub params: &'a Params,
}

pub(crate) fn record_outcome(
    call: &CallInfo<'_>,
    result: &Result<Response, FetchError>,
    elapsed: Duration,
    ledger: &ServiceMeta,
    collector: Option<&StatsCollector>,
) {
    let meta = match result {
        Ok(response) => response.meta.as_ref(),
        Err(error) => error.meta.as_ref(),
    };
    if let Some(meta) = meta.filter(|meta| !meta.is_null()) {
        ledger.push(meta.clone());
    }

    if let Some(collector) = collector {
        let (status_code, err) = match result {
            Ok(_) => (200, None),
            Err(error) => (error.status_code, Some(error.clone())),
        };
        collector(&Stats {
            resource: call.resource.to_string(),
            operation: call.operation,
            params: call.params.clone(),
            status_code,
            err,
            time: elapsed,
        });
    }
}
