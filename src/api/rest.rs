// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Health is public; everything else
// needs a caller identity resolved by the auth gateway (see `Caller`).
//
//   GET /api/v1/health
//   GET /api/v1/symbols
//   GET /api/v1/limits
//   GET /api/v1/indicators/:indicator?symbol=&start_date=&end_date=&<params>
//
// Indicator responses carry `X-Cache: HIT|MISS` and, for metered tiers,
// `X-RateLimit-Remaining`.  Pipeline errors render through
// `PipelineError::into_response`.
//
// CORS is configured permissively; the gateway in front owns origin policy.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::auth::Caller;
use crate::app_state::{AppState, RequestCounters};
use crate::cache::CacheStatus;
use crate::error::PipelineError;
use crate::pipeline::IndicatorQuery;
use crate::types::Parameters;

pub const CACHE_HEADER: &str = "x-cache";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Caller identity required ────────────────────────────────
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/limits", get(limits))
        .route("/api/v1/indicators/:indicator", get(indicator))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    symbols: usize,
    bars: usize,
    requests: RequestCounters,
    uptime_secs: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let prices = state.pipeline.prices();
    let now = state.pipeline.clock().now();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        symbols: prices.symbols().len(),
        bars: prices.bar_count(),
        requests: state.counters(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
        server_time: now.timestamp_millis(),
    })
}

// =============================================================================
// Symbols
// =============================================================================

#[derive(Serialize)]
struct SymbolInfo {
    symbol: String,
    bars: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
}

async fn symbols(_caller: Caller, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let prices = state.pipeline.prices();
    let symbols: Vec<SymbolInfo> = prices
        .symbols()
        .into_iter()
        .map(|symbol| {
            let coverage = prices.coverage(&symbol);
            SymbolInfo {
                bars: prices.get(&symbol).map_or(0, |s| s.len()),
                first_date: coverage.map(|(first, _)| first),
                last_date: coverage.map(|(_, last)| last),
                symbol,
            }
        })
        .collect();
    Json(serde_json::json!({ "count": symbols.len(), "symbols": symbols }))
}

// =============================================================================
// Limits
// =============================================================================

async fn limits(caller: Caller, State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.limits(&caller.user_id, &caller.tier_label).await {
        Ok(view) => Json(serde_json::json!({
            "user_id": caller.user_id,
            "limits": view,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Indicators
// =============================================================================

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| PipelineError::invalid(name, format!("expected YYYY-MM-DD, got {raw:?}")))
}

/// Split the query string into the reserved fields and numeric parameters.
fn build_query(
    caller: Caller,
    indicator: String,
    raw: HashMap<String, String>,
) -> Result<IndicatorQuery, PipelineError> {
    let mut query = IndicatorQuery {
        user_id: caller.user_id,
        tier_label: caller.tier_label,
        indicator,
        ..IndicatorQuery::default()
    };
    let mut parameters = Parameters::new();

    for (name, value) in raw {
        match name.as_str() {
            "symbol" => query.symbol = value,
            "start_date" => query.start_date = Some(parse_date("start_date", &value)?),
            "end_date" => query.end_date = Some(parse_date("end_date", &value)?),
            _ => {
                let number: f64 = value.trim().parse().map_err(|_| {
                    PipelineError::invalid(&name, format!("expected a number, got {value:?}"))
                })?;
                parameters.insert(name, number);
            }
        }
    }

    if query.symbol.trim().is_empty() {
        return Err(PipelineError::invalid("symbol", "is required"));
    }
    query.parameters = parameters;
    Ok(query)
}

async fn indicator(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    Path(indicator): Path<String>,
    Query(raw): Query<HashMap<String, String>>,
) -> Response {
    let outcome = match build_query(caller, indicator, raw) {
        Ok(query) => state.pipeline.handle(query).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(resp) => {
            state.record_served(resp.cache == CacheStatus::Hit);
            let mut response = Json(resp.payload).into_response();
            let headers = response.headers_mut();
            headers.insert(CACHE_HEADER, HeaderValue::from_static(resp.cache.as_str()));
            if let Some(remaining) = resp.quota.remaining {
                headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            }
            response
        }
        Err(e) => {
            state.record_rejected();
            info!(error = %e, kind = e.kind(), "indicator request rejected");
            e.into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::build;
    use crate::runtime_config::TierTable;
    use crate::store::{MemoryCacheStore, MemoryCounterStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(gateway_token: Option<&str>) -> Arc<AppState> {
        let pipeline = build(
            TierTable::default(),
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryCacheStore::new()),
        );
        Arc::new(AppState::new(pipeline, gateway_token.map(str::to_string)))
    }

    fn get(uri: &str, tier: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(tier) = tier {
            builder = builder.header("X-User-Id", "user-1").header("X-User-Tier", tier);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const SMA_URI: &str =
        "/api/v1/indicators/sma?symbol=AAPL&start_date=2024-06-24&end_date=2024-06-28&window=3";

    #[tokio::test]
    async fn health_is_public() {
        let response = router(state(None)).oneshot(get("/api/v1/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["symbols"], 1);
        assert_eq!(body["bars"], 5);
    }

    #[tokio::test]
    async fn identity_is_required() {
        let response = router(state(None)).oneshot(get(SMA_URI, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sma_request_with_headers() {
        let app_state = state(None);
        let response = router(app_state.clone())
            .oneshot(get(SMA_URI, Some("free")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CACHE_HEADER], "MISS");
        assert_eq!(response.headers()[REMAINING_HEADER], "49");
        let body = json(response).await;
        assert_eq!(body["data_points"], 3);
        assert_eq!(body["dates"][0], "2024-06-26");
        assert_eq!(body["indicator"], "sma");

        let again = router(app_state.clone())
            .oneshot(get(SMA_URI, Some("free")))
            .await
            .unwrap();
        assert_eq!(again.headers()[CACHE_HEADER], "HIT");
        assert_eq!(again.headers()[REMAINING_HEADER], "48");
        assert_eq!(app_state.counters().cache_hits, 1);
    }

    #[tokio::test]
    async fn unlimited_tier_has_no_remaining_header() {
        let response = router(state(None))
            .oneshot(get(SMA_URI, Some("premium")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(REMAINING_HEADER).is_none());
    }

    #[tokio::test]
    async fn tier_restriction_maps_to_forbidden() {
        let uri = "/api/v1/indicators/bollinger?symbol=AAPL&start_date=2024-06-24&end_date=2024-06-28&period=2";
        let response = router(state(None)).oneshot(get(uri, Some("free"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json(response).await;
        assert_eq!(body["error"], "TIER_RESTRICTION");
        assert_eq!(body["detail"]["allowed"], serde_json::json!(["sma", "ema"]));
    }

    #[tokio::test]
    async fn malformed_query_values_are_bad_requests() {
        let app = state(None);
        for uri in [
            "/api/v1/indicators/sma?symbol=AAPL&window=abc",
            "/api/v1/indicators/sma?symbol=AAPL&start_date=24-06-2024",
            "/api/v1/indicators/sma?window=3",
        ] {
            let response = router(app.clone()).oneshot(get(uri, Some("free"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json(response).await["error"], "INVALID_PARAMETER");
        }
        assert_eq!(app.counters().rejected, 3);
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let uri = "/api/v1/indicators/sma?symbol=NOPE&window=3";
        let response = router(state(None)).oneshot(get(uri, Some("pro"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn limits_report_remaining_quota() {
        let response = router(state(None))
            .oneshot(get("/api/v1/limits", Some("free")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["user_id"], "user-1");
        assert_eq!(body["limits"]["tier"], "free");
        assert_eq!(body["limits"]["daily_quota"], 50);
        assert_eq!(body["limits"]["remaining_today"], 50);
    }

    #[tokio::test]
    async fn symbols_lists_coverage() {
        let response = router(state(None))
            .oneshot(get("/api/v1/symbols", Some("free")))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["symbols"][0]["symbol"], "AAPL");
        assert_eq!(body["symbols"][0]["first_date"], "2024-06-24");
    }

    #[tokio::test]
    async fn gateway_token_is_enforced() {
        let app = state(Some("s3cret"));
        let response = router(app.clone()).oneshot(get(SMA_URI, Some("free"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri(SMA_URI)
            .header("X-User-Id", "user-1")
            .header("X-User-Tier", "free")
            .header("X-Gateway-Token", "s3cret")
            .body(Body::empty())
            .unwrap();
        let response = router(app).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
