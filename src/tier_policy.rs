// =============================================================================
// Tier Policy — static entitlement table and ordered request validation
// =============================================================================
//
// The table is indexed by the closed `Tier` enum and built once from config.
// Validation runs a fixed list of stages in order; the first failing stage
// decides the error:
//
//   1. entitlement     indicator must be in the tier's allowed set
//   2. lookback_span   range may not span more than the tier's lookback
//   3. lookback_start  range may not start before today - lookback
// =============================================================================

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::IndicatorRequest;
use crate::runtime_config::TierTable;
use crate::types::{IndicatorId, Tier};

/// Resolved entitlements of one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDescriptor {
    pub tier: Tier,
    /// `None` means unlimited.
    pub daily_quota: Option<u32>,
    pub allowed_indicators: Vec<IndicatorId>,
    /// `None` means unlimited.
    pub max_lookback_days: Option<u32>,
}

impl TierDescriptor {
    pub fn allows(&self, indicator: IndicatorId) -> bool {
        self.allowed_indicators.contains(&indicator)
    }

    /// Oldest date this tier may query on `today`.
    pub fn earliest_allowed(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.max_lookback_days
            .map(|days| today - chrono::Duration::days(i64::from(days)))
    }
}

type Stage = fn(&TierDescriptor, &IndicatorRequest, NaiveDate) -> Result<(), PipelineError>;

/// Validation stages in the order they run.
pub const VALIDATION_STAGES: [(&str, Stage); 3] = [
    ("entitlement", check_entitlement),
    ("lookback_span", check_lookback_span),
    ("lookback_start", check_lookback_start),
];

pub fn check_entitlement(
    tier: &TierDescriptor,
    request: &IndicatorRequest,
    _today: NaiveDate,
) -> Result<(), PipelineError> {
    let indicator = request.spec.id();
    if tier.allows(indicator) {
        return Ok(());
    }
    Err(PipelineError::TierRestriction {
        tier: tier.tier,
        indicator,
        allowed: tier.allowed_indicators.clone(),
    })
}

pub fn check_lookback_span(
    tier: &TierDescriptor,
    request: &IndicatorRequest,
    today: NaiveDate,
) -> Result<(), PipelineError> {
    let (Some(max), Some(earliest)) = (tier.max_lookback_days, tier.earliest_allowed(today)) else {
        return Ok(());
    };
    if request.range.span_days() <= i64::from(max) {
        return Ok(());
    }
    Err(PipelineError::DataRange {
        tier: tier.tier,
        requested: request.range,
        max_lookback_days: max,
        earliest_allowed: earliest,
    })
}

pub fn check_lookback_start(
    tier: &TierDescriptor,
    request: &IndicatorRequest,
    today: NaiveDate,
) -> Result<(), PipelineError> {
    let (Some(max), Some(earliest)) = (tier.max_lookback_days, tier.earliest_allowed(today)) else {
        return Ok(());
    };
    if request.range.start >= earliest {
        return Ok(());
    }
    Err(PipelineError::DataRange {
        tier: tier.tier,
        requested: request.range,
        max_lookback_days: max,
        earliest_allowed: earliest,
    })
}

/// Immutable tier → descriptor lookup table.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    table: [TierDescriptor; 3],
}

impl TierPolicy {
    pub fn from_table(tiers: &TierTable) -> Self {
        let table = Tier::ALL.map(|tier| {
            let limits = tiers.limits(tier);
            TierDescriptor {
                tier,
                daily_quota: limits.daily_quota,
                allowed_indicators: limits.allowed_indicators.clone(),
                max_lookback_days: limits.max_lookback_days,
            }
        });
        Self { table }
    }

    pub fn descriptor(&self, tier: Tier) -> &TierDescriptor {
        &self.table[tier.index()]
    }

    /// Look up the descriptor for a tier label supplied by the auth layer.
    pub fn resolve(&self, label: &str) -> Result<&TierDescriptor, PipelineError> {
        let tier: Tier = label.parse().map_err(|_| PipelineError::UnknownTier {
            label: label.to_string(),
        })?;
        Ok(self.descriptor(tier))
    }

    /// Run every validation stage in order, stopping at the first failure.
    pub fn validate(
        &self,
        tier: &TierDescriptor,
        request: &IndicatorRequest,
        today: NaiveDate,
    ) -> Result<(), PipelineError> {
        for (name, stage) in VALIDATION_STAGES {
            if let Err(e) = stage(tier, request, today) {
                debug!(stage = name, tier = %tier.tier, error = %e, "tier validation failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::from_table(&TierTable::default())
    }
}
