// =============================================================================
// Pipeline errors — one structured kind per failure mode
// =============================================================================
//
// Every non-success path of the request pipeline ends in a `PipelineError`.
// Each variant carries the requested and allowed values so callers can
// self-correct, and maps to exactly one HTTP status.
// =============================================================================

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use thiserror::Error;

use crate::types::{DateRange, IndicatorId, Tier};

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("unknown symbol {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("no {symbol} data in {requested}")]
    EmptyRange {
        symbol: String,
        requested: DateRange,
        available: Option<(NaiveDate, NaiveDate)>,
    },

    #[error("{indicator} is not available on the {tier} tier")]
    TierRestriction {
        tier: Tier,
        indicator: IndicatorId,
        allowed: Vec<IndicatorId>,
    },

    #[error("{tier} tier can only access the last {max_lookback_days} days of data")]
    DataRange {
        tier: Tier,
        requested: DateRange,
        max_lookback_days: u32,
        earliest_allowed: NaiveDate,
    },

    #[error("daily quota of {limit} requests exhausted, resets at {reset_at}")]
    QuotaExceeded {
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("{indicator} needs {required} bars, only {available} available")]
    InsufficientData {
        indicator: IndicatorId,
        required: usize,
        available: usize,
    },

    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: String, detail: String },

    #[error("unknown tier {label}")]
    UnknownTier { label: String },

    #[error("service unavailable: {detail}")]
    ServiceUnavailable { detail: String },
}

impl PipelineError {
    pub fn invalid(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSymbol { .. } => "UNKNOWN_SYMBOL",
            Self::EmptyRange { .. } => "EMPTY_RANGE",
            Self::TierRestriction { .. } => "TIER_RESTRICTION",
            Self::DataRange { .. } => "DATA_RANGE",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::UnknownTier { .. } => "UNKNOWN_TIER",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownSymbol { .. } | Self::EmptyRange { .. } => StatusCode::NOT_FOUND,
            Self::TierRestriction { .. } | Self::DataRange { .. } => StatusCode::FORBIDDEN,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownTier { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Structured detail for the response body.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            Self::UnknownSymbol { symbol } => json!({ "symbol": symbol }),
            Self::EmptyRange {
                symbol,
                requested,
                available,
            } => json!({
                "symbol": symbol,
                "requested": requested,
                "available": available.map(|(first, last)| json!({ "start": first, "end": last })),
            }),
            Self::TierRestriction {
                tier,
                indicator,
                allowed,
            } => json!({ "tier": tier, "indicator": indicator, "allowed": allowed }),
            Self::DataRange {
                tier,
                requested,
                max_lookback_days,
                earliest_allowed,
            } => json!({
                "tier": tier,
                "requested": requested,
                "max_lookback_days": max_lookback_days,
                "earliest_allowed": earliest_allowed,
            }),
            Self::QuotaExceeded { limit, reset_at } => {
                json!({ "limit": limit, "reset_at": reset_at })
            }
            Self::InsufficientData {
                indicator,
                required,
                available,
            } => json!({ "indicator": indicator, "required": required, "available": available }),
            Self::InvalidParameter { name, detail } => json!({ "name": name, "reason": detail }),
            Self::UnknownTier { label } => json!({ "tier": label }),
            Self::ServiceUnavailable { .. } => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
            "detail": self.detail(),
        }));

        let mut response = (status, body).into_response();
        if let Self::QuotaExceeded { reset_at, .. } = &self {
            let secs = (*reset_at - Utc::now()).num_seconds().max(0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
