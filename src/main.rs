// =============================================================================
// Tiered Indicator Service — Main Entry Point
// =============================================================================
//
// Startup order: environment and logging, config, price store, counter and
// cache stores (Redis when configured, in-process otherwise), pipeline, HTTP
// server.  Ctrl+C drains in-flight requests before exit.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod cache;
mod error;
mod indicators;
mod market_data;
mod pipeline;
mod quota;
mod runtime_config;
mod store;
mod tier_policy;
mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::cache::CacheLayer;
use crate::market_data::PriceStore;
use crate::pipeline::{RequestPipeline, SystemClock};
use crate::quota::QuotaTracker;
use crate::runtime_config::ServiceConfig;
use crate::store::{CacheStore, CounterStore, MemoryCacheStore, MemoryCounterStore, RedisStore};
use crate::tier_policy::TierPolicy;

const DEFAULT_CONFIG_PATH: &str = "service_config.json";

fn load_config() -> anyhow::Result<ServiceConfig> {
    let path = std::env::var("INDICATORS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = if Path::new(&path).exists() {
        ServiceConfig::load(&path)?
    } else {
        warn!(path = %path, "Config file not found, using defaults");
        ServiceConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Periodically drop expired keys from the in-process stores.
fn spawn_sweeper(counters: Arc<MemoryCounterStore>, cache: Arc<MemoryCacheStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let counters_removed = counters.sweep_expired();
            let cache_removed = cache.sweep_expired();
            info!(
                counters_removed,
                cache_removed,
                counters_live = counters.len(),
                cache_live = cache.len(),
                "In-process store sweep"
            );
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    warn!("Shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Tiered Indicator Service starting");

    let config = load_config()?;
    info!(
        bind_addr = %config.bind_addr,
        data_file = %config.data_file,
        redis = config.store.redis_url.is_some(),
        quota_failure_policy = %config.store.quota_failure_policy,
        single_flight = config.cache.single_flight,
        gateway_token = config.gateway_token.is_some(),
        "Configuration resolved"
    );

    // ── 2. Price store ───────────────────────────────────────────────────
    let prices = Arc::new(
        PriceStore::load_json(&config.data_file)
            .with_context(|| format!("loading price data from {}", config.data_file))?,
    );

    // ── 3. Counter & cache stores ────────────────────────────────────────
    let (counters, cache_store): (Arc<dyn CounterStore>, Arc<dyn CacheStore>) =
        match config.store.redis_url.as_deref() {
            Some(url) => {
                let redis = Arc::new(
                    RedisStore::connect(url)
                        .await
                        .context("connecting to Redis")?,
                );
                let counters: Arc<dyn CounterStore> = redis.clone();
                let cache: Arc<dyn CacheStore> = redis;
                (counters, cache)
            }
            None => {
                warn!("No Redis URL configured, quota and cache state is process-local");
                let counters = Arc::new(MemoryCounterStore::new());
                let cache = Arc::new(MemoryCacheStore::new());
                spawn_sweeper(
                    counters.clone(),
                    cache.clone(),
                    Duration::from_secs(config.store.sweep_interval_secs.max(1)),
                );
                let counters: Arc<dyn CounterStore> = counters;
                let cache: Arc<dyn CacheStore> = cache;
                (counters, cache)
            }
        };

    // ── 4. Pipeline ──────────────────────────────────────────────────────
    let policy = Arc::new(TierPolicy::from_table(&config.tiers));
    for tier in crate::types::Tier::ALL {
        let d = policy.descriptor(tier);
        info!(
            tier = %tier,
            daily_quota = ?d.daily_quota,
            max_lookback_days = ?d.max_lookback_days,
            indicators = ?d.allowed_indicators,
            "Tier loaded"
        );
    }

    let pipeline = RequestPipeline::new(
        prices,
        policy,
        QuotaTracker::new(counters, &config.store),
        CacheLayer::new(cache_store, config.cache.clone(), &config.store),
        Arc::new(SystemClock),
    );
    let state = Arc::new(AppState::new(pipeline, config.gateway_token.clone()));

    // ── 5. HTTP server ───────────────────────────────────────────────────
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    info!("Tiered Indicator Service shut down complete.");
    Ok(())
}
