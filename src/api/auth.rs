// =============================================================================
// Caller Identity — Axum extractor for gateway-resolved users
// =============================================================================
//
// Credentials are verified upstream by the auth gateway, which forwards the
// resolved identity as two headers:
//
//   X-User-Id:   opaque user identifier
//   X-User-Tier: tier label (free | pro | premium)
//
// When a gateway token is configured the request must also carry a matching
// `X-Gateway-Token`, compared in constant time.  Any failure short-circuits
// with 401 before the handler body executes.
//
// Usage:
//
//   async fn handler(caller: Caller, ...) { ... }
// =============================================================================

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_TIER_HEADER: &str = "x-user-tier";
pub const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";

// =============================================================================
// Constant-time comparison
// =============================================================================

/// Compare two byte slices without short-circuiting on the first mismatch.
/// Only the length difference is observable.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// =============================================================================
// Extractor
// =============================================================================

/// Identity of the caller as resolved by the auth gateway.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub tier_label: String,
}

pub struct AuthRejection {
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": "UNAUTHORIZED",
            "message": self.message,
        });
        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.gateway_token.as_deref() {
            let presented = header(&parts.headers, GATEWAY_TOKEN_HEADER).unwrap_or_default();
            if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
                warn!("Missing or invalid gateway token");
                return Err(AuthRejection {
                    message: "Invalid gateway token",
                });
            }
        }

        let (Some(user_id), Some(tier_label)) = (
            header(&parts.headers, USER_ID_HEADER),
            header(&parts.headers, USER_TIER_HEADER),
        ) else {
            warn!("Request without resolved caller identity");
            return Err(AuthRejection {
                message: "Missing caller identity",
            });
        };

        Ok(Caller {
            user_id: user_id.to_string(),
            tier_label: tier_label.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
