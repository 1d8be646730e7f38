//! Admission layer (spec.md section 4.7): CORS gate, per-IP rate limit, and
//! bearer auth for privileged routes, applied to every request in that
//! order. Path/query validation happens inside each handler instead, via
//! [`crate::api::validation`].

use crate::api::error::ApiError;
use crate::app::AppState;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Process-wide per-IP token bucket (spec.md section 5's "shared
/// resources"): `requests_per_window` tokens, refilled evenly over
/// `window_secs`.
pub fn build_ip_limiter(requests_per_window: u32, window_secs: u64) -> Arc<IpLimiter> {
    let capacity = NonZeroU32::new(requests_per_window.max(1)).expect("capacity is clamped to at least 1");
    let period = Duration::from_secs_f64(window_secs as f64 / f64::from(capacity.get()));
    let quota = Quota::with_period(period).expect("window_secs is positive").allow_burst(capacity);
    Arc::new(RateLimiter::dashmap(quota))
}

/// Step 1 (spec.md section 4.7): non-GET requests carrying an `Origin`
/// outside the configured allow-list are rejected before anything else runs.
pub async fn cors_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(ORIGIN).and_then(|value| value.to_str().ok());
    if request.method() != Method::GET {
        if let Some(origin) = origin {
            if !state.config.cors_allow_list().iter().any(|allowed| allowed == origin) {
                return ApiError::CorsDenied.into_response();
            }
        }
    }
    next.run(request).await
}

/// Step 2 (spec.md section 4.7): keyed by the forwarded-for header; requests
/// without that header (e.g. same-host integration tests) pass through
/// unrated rather than being grouped under one shared bucket.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ip) = forwarded_for(&request) {
        if state.ip_limiter.check_key(&ip).is_err() {
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(request).await
}

fn forwarded_for(request: &Request) -> Option<String> {
    let raw = request.headers().get("x-forwarded-for")?.to_str().ok()?;
    Some(raw.split(',').next().unwrap_or(raw).trim().to_owned())
}

/// Step 3 (spec.md section 4.7): applied only to privileged routes via
/// `route_layer`. Fails closed with 503 if no secret is configured at all,
/// rather than treating "no secret" as "no auth required".
pub async fn require_bearer_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.trigger_secret.as_deref() else {
        return ApiError::AuthNotConfigured.into_response();
    };
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_accepts_matching_secrets() {
        assert!(constant_time_eq(b"super-secret-token", b"super-secret-token"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq(b"short", b"much-longer-secret"));
    }

    #[test]
    fn constant_time_eq_rejects_same_length_mismatch() {
        assert!(!constant_time_eq(b"super-secret-token", b"super-secret-wrong!"));
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.5, 70.41.3.18")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(forwarded_for(&request), Some("203.0.113.5".to_owned()));
    }

    #[test]
    fn missing_forwarded_for_header_is_unrated() {
        let request = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(forwarded_for(&request), None);
    }
}
