// =============================================================================
// Quota Tracker — per-user daily request counters
// =============================================================================
//
// One counter per (user, UTC calendar day) lives in the external counter
// store under `{prefix}:quota:{user}:{YYYY-MM-DD}`.  Admission is a single
// INCR followed by a read-back comparison against the tier's daily quota, so
// concurrent callers can never be granted more than the quota: the store
// serialises the increments and only the first `n` see a value <= `n`.
//
// Every increment also sets the key to expire at the next UTC midnight, so a
// lost expiry is repaired by the user's next request.  Unlimited tiers never
// touch the store.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::runtime_config::{QuotaFailurePolicy, StoreSettings};
use crate::store::{with_timeout, CounterStore, StoreError};
use crate::tier_policy::TierDescriptor;

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaGrant {
    /// Requests left today after this one.  `None` when the tier is unlimited
    /// or the store could not be reached under the fail-open policy.
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaGrant {
    fn unlimited() -> Self {
        Self {
            remaining: None,
            reset_at: None,
        }
    }
}

/// Start of the next UTC day.
pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Duration::days(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

pub struct QuotaTracker {
    store: Arc<dyn CounterStore>,
    key_prefix: String,
    timeout: Duration,
    policy: QuotaFailurePolicy,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn CounterStore>, settings: &StoreSettings) -> Self {
        Self {
            store,
            key_prefix: settings.key_prefix.clone(),
            timeout: settings.timeout(),
            policy: settings.quota_failure_policy,
        }
    }

    pub fn key(&self, user_id: &str, day: NaiveDate) -> String {
        format!("{}:quota:{}:{}", self.key_prefix, user_id, day.format("%Y-%m-%d"))
    }

    /// Count one request against `user_id`'s quota for the day of `now`.
    pub async fn try_consume(
        &self,
        user_id: &str,
        tier: &TierDescriptor,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, PipelineError> {
        let Some(limit) = tier.daily_quota else {
            return Ok(QuotaGrant::unlimited());
        };

        let key = self.key(user_id, now.date_naive());
        let reset_at = next_reset(now);

        let ttl = (reset_at - now).to_std().unwrap_or(Duration::from_secs(1));

        let count = match with_timeout(self.timeout, self.store.incr_with_expiry(&key, ttl)).await {
            Ok(count) => count,
            Err(e) => return self.on_store_failure(user_id, "incr", e).map(|_| QuotaGrant::unlimited()),
        };

        if count > i64::from(limit) {
            debug!(user = %user_id, tier = %tier.tier, count, limit, "daily quota exhausted");
            return Err(PipelineError::QuotaExceeded { limit, reset_at });
        }

        let remaining = u32::try_from(i64::from(limit) - count).unwrap_or(0);
        debug!(user = %user_id, tier = %tier.tier, count, remaining, "quota consumed");
        Ok(QuotaGrant {
            remaining: Some(remaining),
            reset_at: Some(reset_at),
        })
    }

    /// Requests left today without consuming one.
    pub async fn remaining(
        &self,
        user_id: &str,
        tier: &TierDescriptor,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, PipelineError> {
        let Some(limit) = tier.daily_quota else {
            return Ok(QuotaGrant::unlimited());
        };

        let key = self.key(user_id, now.date_naive());
        let used = match with_timeout(self.timeout, self.store.get(&key)).await {
            Ok(used) => used.unwrap_or(0),
            Err(e) => return self.on_store_failure(user_id, "get", e).map(|_| QuotaGrant::unlimited()),
        };

        Ok(QuotaGrant {
            remaining: Some(u32::try_from((i64::from(limit) - used).max(0)).unwrap_or(0)),
            reset_at: Some(next_reset(now)),
        })
    }

    fn on_store_failure(&self, user_id: &str, op: &str, e: StoreError) -> Result<(), PipelineError> {
        match self.policy {
            QuotaFailurePolicy::FailOpen => {
                warn!(user = %user_id, op, error = %e, "quota store unavailable, granting (fail_open)");
                Ok(())
            }
            QuotaFailurePolicy::FailClosed => {
                warn!(user = %user_id, op, error = %e, "quota store unavailable, rejecting (fail_closed)");
                Err(PipelineError::ServiceUnavailable {
                    detail: format!("quota store unavailable: {e}"),
                })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
