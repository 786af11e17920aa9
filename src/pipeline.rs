// =============================================================================
// Request Pipeline — one indicator request from caller identity to payload
// =============================================================================
//
//   Received
//     → TierResolved   tier label → descriptor             (UnknownTier)
//     → Validated      indicator + parameters, date order, (InvalidParameter)
//                      tier stages, symbol existence       (TierRestriction,
//                                                           DataRange,
//                                                           UnknownSymbol)
//     → QuotaChecked   one atomic increment                (QuotaExceeded,
//                                                           ServiceUnavailable)
//     → CacheHit → Done
//     → CacheMiss → Computed → CacheStored → Done          (EmptyRange,
//                                                           InsufficientData)
//
// Any failing stage ends the request.  Quota is consumed at most once and
// only after validation passes; a cache hit still consumes it.  The cache is
// written at most once per request and never on failure.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::cache::{CacheLayer, CacheLookup, CacheStatus, TtlClass};
use crate::error::PipelineError;
use crate::indicators::{IndicatorSpec, IndicatorValues};
use crate::market_data::PriceStore;
use crate::quota::{QuotaGrant, QuotaTracker};
use crate::tier_policy::{TierDescriptor, TierPolicy};
use crate::types::{normalize_symbol, DateRange, IndicatorId, Parameters, Tier, DEFAULT_RANGE_DAYS};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for day boundaries and lookback windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct FixedClock(parking_lot::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(parking_lot::Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Raw request as handed over by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct IndicatorQuery {
    pub user_id: String,
    pub tier_label: String,
    pub symbol: String,
    pub indicator: String,
    pub parameters: Parameters,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Validated request.
#[derive(Debug, Clone)]
pub struct IndicatorRequest {
    pub symbol: String,
    pub spec: IndicatorSpec,
    pub range: DateRange,
    pub tier: Tier,
}

/// Success payload; also the value stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPayload {
    pub symbol: String,
    pub indicator: IndicatorId,
    pub parameters: Parameters,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_points: usize,
    pub dates: Vec<NaiveDate>,
    pub values: IndicatorValues,
}

#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub payload: IndicatorPayload,
    pub cache: CacheStatus,
    pub quota: QuotaGrant,
}

/// Caller's entitlements and today's remaining quota.
#[derive(Debug, Clone, Serialize)]
pub struct LimitsView {
    #[serde(flatten)]
    pub tier: TierDescriptor,
    pub remaining_today: Option<u32>,
    pub resets_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct RequestPipeline {
    prices: Arc<PriceStore>,
    policy: Arc<TierPolicy>,
    quota: QuotaTracker,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
}

impl RequestPipeline {
    pub fn new(
        prices: Arc<PriceStore>,
        policy: Arc<TierPolicy>,
        quota: QuotaTracker,
        cache: CacheLayer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prices,
            policy,
            quota,
            cache,
            clock,
        }
    }

    pub fn prices(&self) -> &PriceStore {
        &self.prices
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub async fn handle(&self, query: IndicatorQuery) -> Result<PipelineResponse, PipelineError> {
        let span = info_span!(
            "indicator_request",
            request_id = %Uuid::new_v4(),
            user = %query.user_id,
            tier = %query.tier_label,
            symbol = %query.symbol,
            indicator = %query.indicator,
        );
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: IndicatorQuery) -> Result<PipelineResponse, PipelineError> {
        let now = self.clock.now();
        let today = now.date_naive();

        // -- TierResolved ----------------------------------------------------
        let tier = self.policy.resolve(&query.tier_label)?;
        debug!(stage = "tier_resolved", tier = %tier.tier);

        // -- Validated -------------------------------------------------------
        let request = self.validate(&query, tier, today)?;
        debug!(stage = "validated", range = %request.range);

        // -- QuotaChecked ----------------------------------------------------
        let grant = self.quota.try_consume(&query.user_id, tier, now).await?;
        debug!(stage = "quota_checked", remaining = ?grant.remaining);

        // -- Cache -----------------------------------------------------------
        let id = request.spec.id();
        let parameters = request.spec.canonical_parameters();
        let key = self.cache.key(id, &request.symbol, &parameters, &request.range);

        let mut flight = None;
        match self.cache.get::<IndicatorPayload>(&key).await {
            CacheLookup::Hit(payload) => {
                debug!(stage = "cache_hit");
                return Ok(PipelineResponse {
                    payload,
                    cache: CacheStatus::Hit,
                    quota: grant,
                });
            }
            CacheLookup::Unavailable => debug!(stage = "cache_unavailable"),
            CacheLookup::Miss => {
                flight = self.cache.lock(&key).await;
                if flight.is_some() {
                    // Another caller may have filled the key while we waited.
                    match self.cache.get::<IndicatorPayload>(&key).await {
                        CacheLookup::Hit(payload) => {
                            debug!(stage = "cache_hit", after_wait = true);
                            return Ok(PipelineResponse {
                                payload,
                                cache: CacheStatus::Hit,
                                quota: grant,
                            });
                        }
                        CacheLookup::Unavailable => flight = None,
                        CacheLookup::Miss => {}
                    }
                }
            }
        }

        // -- Computed --------------------------------------------------------
        let payload = self.compute(&request, parameters)?;
        debug!(stage = "computed", data_points = payload.data_points);

        // -- CacheStored -----------------------------------------------------
        self.cache
            .put(&key, &payload, TtlClass::for_range(&request.range, today))
            .await;
        drop(flight);

        info!(data_points = payload.data_points, "indicator computed");
        Ok(PipelineResponse {
            payload,
            cache: CacheStatus::Miss,
            quota: grant,
        })
    }

    fn validate(
        &self,
        query: &IndicatorQuery,
        tier: &TierDescriptor,
        today: NaiveDate,
    ) -> Result<IndicatorRequest, PipelineError> {
        let id: IndicatorId = query.indicator.parse().map_err(|_| {
            PipelineError::invalid(
                "indicator",
                format!(
                    "unknown indicator {:?}, expected one of sma, ema, rsi, macd, bollinger",
                    query.indicator
                ),
            )
        })?;
        let spec = IndicatorSpec::parse(id, &query.parameters)?;

        let symbol = normalize_symbol(&query.symbol);
        if symbol.is_empty() {
            return Err(PipelineError::invalid("symbol", "must not be empty"));
        }

        let range = DateRange::resolve(query.start_date, query.end_date, today).ok_or_else(|| {
            PipelineError::invalid(
                "end_date",
                format!(
                    "{} leaves no room for the default {DEFAULT_RANGE_DAYS}-day range",
                    query.end_date.unwrap_or(today)
                ),
            )
        })?;
        if range.start > range.end {
            return Err(PipelineError::invalid(
                "start_date",
                format!("{} is after end_date {}", range.start, range.end),
            ));
        }

        let request = IndicatorRequest {
            symbol,
            spec,
            range,
            tier: tier.tier,
        };
        self.policy.validate(tier, &request, today)?;

        if !self.prices.contains(&request.symbol) {
            return Err(PipelineError::UnknownSymbol {
                symbol: request.symbol,
            });
        }
        Ok(request)
    }

    fn compute(
        &self,
        request: &IndicatorRequest,
        parameters: Parameters,
    ) -> Result<IndicatorPayload, PipelineError> {
        let id = request.spec.id();
        let slice = self.prices.range_slice(&request.symbol, request.range)?;
        let output = request
            .spec
            .compute(&slice)
            .map_err(|e| e.into_pipeline(id))?;

        let dates = slice.dates[output.offset..].to_vec();
        debug_assert_eq!(dates.len(), output.values.len());

        Ok(IndicatorPayload {
            symbol: request.symbol.clone(),
            indicator: id,
            parameters,
            start_date: request.range.start,
            end_date: request.range.end,
            data_points: dates.len(),
            dates,
            values: output.values,
        })
    }

    /// Entitlements and remaining quota for the limits endpoint.
    pub async fn limits(&self, user_id: &str, tier_label: &str) -> Result<LimitsView, PipelineError> {
        let tier = self.policy.resolve(tier_label)?;
        let grant = self.quota.remaining(user_id, tier, self.clock.now()).await?;
        Ok(LimitsView {
            tier: tier.clone(),
            remaining_today: grant.remaining,
            resets_at: grant.reset_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
