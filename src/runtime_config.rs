// =============================================================================
// Service Configuration — tier table, cache TTLs, store settings
// =============================================================================
//
// Loaded once at startup and immutable for the life of the process.  All
// fields carry `#[serde(default)]` so that a partial JSON file only overrides
// what it names.  A handful of deployment values can also be overridden from
// the environment (see `apply_env_overrides`).
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{IndicatorId, Tier};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_data_file() -> String {
    "data/stocks_ohlc_data.json".to_string()
}

fn default_volatile_ttl_secs() -> u64 {
    30 * 60
}

fn default_historical_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_key_prefix() -> String {
    "indicators".to_string()
}

// =============================================================================
// Tier table
// =============================================================================

/// Entitlements of one tier.  `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    pub daily_quota: Option<u32>,
    pub allowed_indicators: Vec<IndicatorId>,
    pub max_lookback_days: Option<u32>,
}

/// Per-tier limits, one entry per closed `Tier` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "TierTable::default_free")]
    pub free: TierLimits,
    #[serde(default = "TierTable::default_pro")]
    pub pro: TierLimits,
    #[serde(default = "TierTable::default_premium")]
    pub premium: TierLimits,
}

impl TierTable {
    fn default_free() -> TierLimits {
        TierLimits {
            daily_quota: Some(50),
            allowed_indicators: vec![IndicatorId::Sma, IndicatorId::Ema],
            max_lookback_days: Some(90),
        }
    }

    fn default_pro() -> TierLimits {
        TierLimits {
            daily_quota: Some(500),
            allowed_indicators: vec![
                IndicatorId::Sma,
                IndicatorId::Ema,
                IndicatorId::Rsi,
                IndicatorId::Macd,
            ],
            max_lookback_days: Some(365),
        }
    }

    fn default_premium() -> TierLimits {
        TierLimits {
            daily_quota: None,
            allowed_indicators: vec![
                IndicatorId::Sma,
                IndicatorId::Ema,
                IndicatorId::Rsi,
                IndicatorId::Macd,
                IndicatorId::Bollinger,
            ],
            max_lookback_days: None,
        }
    }

    pub fn limits(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Pro => &self.pro,
            Tier::Premium => &self.premium,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            free: Self::default_free(),
            pro: Self::default_pro(),
            premium: Self::default_premium(),
        }
    }
}

// =============================================================================
// Cache and store settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL for results whose range reaches today or later.
    #[serde(default = "default_volatile_ttl_secs")]
    pub volatile_ttl_secs: u64,

    /// TTL for results that lie entirely in closed history.
    #[serde(default = "default_historical_ttl_secs")]
    pub historical_ttl_secs: u64,

    /// Let only one concurrent caller compute a missing key.
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            volatile_ttl_secs: default_volatile_ttl_secs(),
            historical_ttl_secs: default_historical_ttl_secs(),
            single_flight: true,
        }
    }
}

/// What the quota tracker does when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotaFailurePolicy {
    /// Reject the request with `ServiceUnavailable`.
    #[default]
    FailClosed,
    /// Grant the request and log a warning.
    FailOpen,
}

impl std::fmt::Display for QuotaFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailClosed => write!(f, "fail_closed"),
            Self::FailOpen => write!(f, "fail_open"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Redis URL for the counter and cache stores.  Without one the service
    /// runs on the in-process stores.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for every key written to the stores.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on any single store call.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub quota_failure_policy: QuotaFailurePolicy,

    /// How often the in-process counter store drops expired keys.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            timeout_ms: default_store_timeout_ms(),
            quota_failure_policy: QuotaFailurePolicy::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// =============================================================================
// ServiceConfig
// =============================================================================

/// Top-level configuration for the indicator service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP surface listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON price file loaded into the price store at startup.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Shared secret expected in `X-Gateway-Token` from the auth gateway.
    /// Unset means the header is not checked.
    #[serde(default)]
    pub gateway_token: Option<String>,

    #[serde(default)]
    pub tiers: TierTable,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_file: default_data_file(),
            gateway_token: None,
            tiers: TierTable::default(),
            cache: CacheSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {}", path.display()))?;
        info!(path = %path.display(), "Service config loaded");
        Ok(config)
    }

    /// Apply `INDICATORS_*` / `REDIS_URL` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("INDICATORS_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(file) = lookup("INDICATORS_DATA_FILE") {
            self.data_file = file;
        }
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.trim().is_empty()) {
            self.store.redis_url = Some(url);
        }
        if let Some(token) = lookup("INDICATORS_GATEWAY_TOKEN").filter(|t| !t.is_empty()) {
            self.gateway_token = Some(token);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_table() {
        let tiers = TierTable::default();
        assert_eq!(tiers.free.daily_quota, Some(50));
        assert_eq!(tiers.pro.max_lookback_days, Some(365));
        assert_eq!(tiers.premium.daily_quota, None);
        assert!(tiers.premium.allowed_indicators.contains(&IndicatorId::Bollinger));
        assert!(!tiers.free.allowed_indicators.contains(&IndicatorId::Rsi));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "tiers": { "free": { "daily_quota": 5, "allowed_indicators": ["sma"], "max_lookback_days": 30 } },
            "store": { "quota_failure_policy": "fail_open" }
        }"#;
        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tiers.free.daily_quota, Some(5));
        assert_eq!(config.tiers.pro, TierTable::default_pro());
        assert_eq!(config.store.quota_failure_policy, QuotaFailurePolicy::FailOpen);
        assert_eq!(config.store.timeout_ms, 250);
        assert_eq!(config.cache.volatile_ttl_secs, 1800);
        assert!(config.cache.single_flight);
    }

    #[test]
    fn null_means_unlimited() {
        let json = r#"{ "daily_quota": null, "allowed_indicators": [], "max_lookback_days": null }"#;
        let limits: TierLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.daily_quota, None);
        assert_eq!(limits.max_lookback_days, None);
    }

    #[test]
    fn env_overrides() {
        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| match key {
            "INDICATORS_BIND_ADDR" => Some("127.0.0.1:9000".into()),
            "REDIS_URL" => Some("redis://cache:6379".into()),
            "INDICATORS_GATEWAY_TOKEN" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.gateway_token, None);
        assert_eq!(config.data_file, default_data_file());
    }

    #[test]
    fn load_round_trip() {
        let dir = std::env::temp_dir().join(format!("svc-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("service_config.json");
        std::fs::write(&path, r#"{ "bind_addr": "127.0.0.1:1" }"#).unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:1");
        assert!(ServiceConfig::load(dir.join("missing.json")).is_err());
        std::fs::remove_dir_all(dir).ok();
    }
}
