//! The health endpoint.
//!
//! Authenticates the caller, parses which sections to run, hands the request
//! to the [`HealthChecker`](crate::health::HealthChecker) and renders the
//! report as JSON or as the HTML fallback.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    Extension,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use crate::error::AppError;
use crate::health::{HealthReport, HealthRequest, OutputFormat};
use crate::middleware::RequestContext;
use crate::state::AppState;
use crate::templates::HEALTH_TEMPLATE;

/// Who is calling, as established from the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated,
    /// Holds an admin token; may trigger a cache flush
    Elevated,
}

impl Caller {
    pub fn is_elevated(&self) -> bool {
        matches!(self, Caller::Elevated)
    }
}

/// Health check handler.
pub async fn check(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let caller = authenticate(&state, &headers)?;

    let mut request = HealthRequest::from_parts(&query, &headers).elevated(caller.is_elevated());
    if state.config.health.always_json {
        request.format = OutputFormat::Json;
    }
    if request.should_flush() {
        tracing::warn!(caller = ?caller, "Object cache flush requested");
    }

    let report = state.checker.evaluate(request, context.started).await;
    render(&state, report)
}

/// Resolve the caller from `Authorization: Bearer <token>`.
///
/// An unknown or missing token is only rejected when the policy requires
/// authentication.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Caller, AppError> {
    let auth = &state.config.auth;
    let caller = match bearer_token(headers) {
        Some(token) if matches_any(token, &auth.admin_tokens) => Caller::Elevated,
        Some(token) if matches_any(token, &auth.tokens) => Caller::Authenticated,
        _ => Caller::Anonymous,
    };

    if caller == Caller::Anonymous && state.policy.require_authentication() {
        tracing::debug!("Rejected unauthenticated health request");
        return Err(AppError::Unauthorized);
    }

    Ok(caller)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

fn matches_any(token: &str, candidates: &[String]) -> bool {
    candidates
        .iter()
        .fold(false, |found, candidate| {
            constant_time_eq(token.as_bytes(), candidate.as_bytes()) | found
        })
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn render(state: &AppState, report: HealthReport) -> Result<Response, AppError> {
    match report.format {
        OutputFormat::Json => {
            let body = report.to_json(state.config.health.pretty)?;
            Ok((
                report.http_status,
                [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                body,
            )
                .into_response())
        }
        OutputFormat::Html => {
            let mut context = tera::Context::new();
            context.insert("status", report.summary.as_str());
            context.insert("checks", &report.payload);
            let html = state.tera.render(HEALTH_TEMPLATE, &context)?;
            Ok((report.http_status, Html(html)).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }

    #[test]
    fn test_matches_any() {
        let tokens = vec!["one".to_string(), "two".to_string()];
        assert!(matches_any("two", &tokens));
        assert!(!matches_any("three", &tokens));
        assert!(!matches_any("one", &[]));
    }
}
