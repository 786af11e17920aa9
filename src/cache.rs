// =============================================================================
// Cache Layer — deterministic result keys over the external cache store
// =============================================================================
//
// Key:   {prefix}:indicator:{hex(sha256(canonical))}
//        canonical = "{indicator}|{symbol}|{name=value;...}|{start}|{end}"
//        Parameters are the typed, default-filled set in sorted name order,
//        so map ordering and omitted defaults never change the key.
//
// TTL:   Volatile when the range reaches today or later, Historical when it
//        lies entirely in closed history.
//
// Every store fault (error, timeout, undecodable bytes) is logged and
// treated as a miss or a no-op.  The cache can never fail a request.
// Reads tell a real miss apart from an unreachable store, so callers only
// queue behind single-flight when the store is answering.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::runtime_config::{CacheSettings, StoreSettings};
use crate::store::{with_timeout, CacheStore};
use crate::types::{DateRange, IndicatorId, Parameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Volatile,
    Historical,
}

impl TtlClass {
    pub fn for_range(range: &DateRange, today: NaiveDate) -> Self {
        if range.end >= today {
            Self::Volatile
        } else {
            Self::Historical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// The store could not answer.  Callers compute without waiting on
    /// single-flight, since a stalled store would serialise them.
    Unavailable,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

type FlightSlots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Held by the one caller allowed to compute a missing key.  Dropping it
/// lets the next waiter in, and removes the slot once nobody else holds it.
pub struct FlightGuard {
    key: String,
    slots: FlightSlots,
    _permit: OwnedMutexGuard<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        // Map entry plus our own permit.
        let idle = slots
            .get(&self.key)
            .map_or(false, |slot| Arc::strong_count(slot) <= 2);
        if idle {
            slots.remove(&self.key);
        }
    }
}

pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    timeout: Duration,
    settings: CacheSettings,
    flights: FlightSlots,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings, store_settings: &StoreSettings) -> Self {
        Self {
            store,
            key_prefix: store_settings.key_prefix.clone(),
            timeout: store_settings.timeout(),
            settings,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn key(
        &self,
        indicator: IndicatorId,
        symbol: &str,
        parameters: &Parameters,
        range: &DateRange,
    ) -> String {
        let params = parameters
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(";");
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            indicator, symbol, params, range.start, range.end
        );
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{}:indicator:{}", self.key_prefix, hex::encode(digest))
    }

    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Volatile => Duration::from_secs(self.settings.volatile_ttl_secs),
            TtlClass::Historical => Duration::from_secs(self.settings.historical_ttl_secs),
        }
    }

    /// Read and decode `key`.  Store errors and timeouts come back as
    /// [`CacheLookup::Unavailable`]; absent or undecodable entries as
    /// [`CacheLookup::Miss`].
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let bytes = match with_timeout(self.timeout, self.store.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, computing directly");
                return CacheLookup::Unavailable;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => CacheLookup::Hit(value),
            Err(e) => {
                warn!(key = %key, error = %e, "undecodable cache entry, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, class: TtlClass) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache entry");
                return;
            }
        };
        let ttl = self.ttl(class);
        match with_timeout(self.timeout, self.store.set(key, bytes, ttl)).await {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "cache entry stored"),
            Err(e) => warn!(key = %key, error = %e, "cache write failed"),
        }
    }

    /// Wait for exclusive right to compute `key`.  `None` when single-flight
    /// is disabled.
    pub async fn lock(&self, key: &str) -> Option<FlightGuard> {
        if !self.settings.single_flight {
            return None;
        }
        let slot = self
            .flights
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let permit = slot.lock_owned().await;
        Some(FlightGuard {
            key: key.to_string(),
            slots: self.flights.clone(),
            _permit: permit,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
