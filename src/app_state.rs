// =============================================================================
// Central Application State — shared by every HTTP handler
// =============================================================================
//
// Everything here is either immutable after startup (pipeline wiring, price
// store, tier table, gateway token) or an atomic counter, so handlers share
// it through `Arc<AppState>` without any lock spanning a request.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::RequestPipeline;

/// Process-lifetime request counters for the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequestCounters {
    pub served: u64,
    pub rejected: u64,
    pub cache_hits: u64,
}

pub struct AppState {
    pub pipeline: RequestPipeline,

    /// Expected `X-Gateway-Token`; `None` disables the check.
    pub gateway_token: Option<String>,

    pub started_at: DateTime<Utc>,

    served: AtomicU64,
    rejected: AtomicU64,
    cache_hits: AtomicU64,
}

impl AppState {
    pub fn new(pipeline: RequestPipeline, gateway_token: Option<String>) -> Self {
        Self {
            pipeline,
            gateway_token,
            started_at: Utc::now(),
            served: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub fn record_served(&self, cache_hit: bool) {
        self.served.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> RequestCounters {
        RequestCounters {
            served: self.served.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
