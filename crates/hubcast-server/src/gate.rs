//! Admission gate for the upgrade route.
//!
//! Runs as middleware in front of the `WebSocketUpgrade` extractor, so a
//! request that fails here never reaches the upgrade. An admitted request is
//! forwarded unchanged with its [`Principal`] attached as an extension.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hubcast_core::{AdmissionPolicy, AuthError, Authenticator, Principal};
use metrics::counter;
use tracing::{debug, instrument};

use crate::metrics::WS_AUTH_REJECTIONS_TOTAL;

const BEARER_PREFIX: &str = "Bearer ";
const TOKEN_COOKIE: &str = "Token";

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no credential presented")]
    MissingCredential,
    #[error("credential rejected: {0}")]
    InvalidCredential(AuthError),
    #[error("{subject} lacks read access")]
    InsufficientPermission { subject: String },
    #[error("credential check timed out")]
    Timeout,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::InsufficientPermission { .. } => "insufficient_permission",
            Self::Timeout => "timeout",
        }
    }
}

/// What the gate needs to decide on a request.
#[derive(Clone)]
pub struct GateState {
    authenticator: Arc<dyn Authenticator>,
    policy: AdmissionPolicy,
    timeout: Duration,
}

impl GateState {
    pub fn new(authenticator: Arc<dyn Authenticator>, policy: AdmissionPolicy, timeout: Duration) -> Self {
        Self {
            authenticator,
            policy,
            timeout,
        }
    }
}

/// Pull the bearer credential out of the request headers.
///
/// A usable `Authorization: Bearer` header wins. Otherwise the last cookie
/// named `Token` (any case) across all `Cookie` headers is used.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if value.len() > BEARER_PREFIX.len() {
            if let Some(rest) = value.strip_prefix(BEARER_PREFIX) {
                let token = rest.trim();
                return (!token.is_empty()).then(|| token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(TOKEN_COOKIE))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .last()
        .filter(|token| !token.is_empty())
}

/// Decide whether the request may open a stream.
pub async fn admit(gate: &GateState, headers: &HeaderMap) -> Result<Principal, Rejection> {
    let token = extract_credential(headers).ok_or(Rejection::MissingCredential)?;

    let principal = tokio::time::timeout(gate.timeout, gate.authenticator.authenticate(&token))
        .await
        .map_err(|_| Rejection::Timeout)?
        .map_err(Rejection::InvalidCredential)?;

    if gate.policy.permits(&principal) {
        Ok(principal)
    } else {
        Err(Rejection::InsufficientPermission {
            subject: principal.subject,
        })
    }
}

/// Middleware: admit or answer 401.
#[instrument(skip_all, name = "gate")]
pub async fn authorize(State(gate): State<GateState>, mut request: Request, next: Next) -> Response {
    match admit(&gate, request.headers()).await {
        Ok(principal) => {
            debug!(subject = %principal.subject, "upgrade admitted");
            let _ = request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(rejection) => {
            counter!(WS_AUTH_REJECTIONS_TOTAL, "reason" => rejection.reason()).increment(1);
            debug!(reason = rejection.reason(), error = %rejection, "upgrade rejected");
            unauthorized()
        }
    }
}

/// `401` with an empty body, after which the connection is closed.
pub fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    let headers = response.headers_mut();
    let _ = headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    let _ = headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hubcast_core::auth::{ROLE_ADMINISTRATOR, ROLE_USER_READ};
    use hubcast_core::StaticTokenAuthenticator;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let _ = map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn gate() -> GateState {
        let auth = StaticTokenAuthenticator::new()
            .with_token("reader", Principal::new("r", [ROLE_USER_READ]))
            .with_token("admin", Principal::new("a", [ROLE_ADMINISTRATOR]))
            .with_token("writer", Principal::new("w", ["userWrite"]));
        GateState::new(Arc::new(auth), AdmissionPolicy::default(), Duration::from_secs(1))
    }

    #[test]
    fn bearer_header() {
        let h = headers(&[("authorization", "Bearer abc123")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("abc123"));
    }

    #[test]
    fn bearer_remainder_is_trimmed() {
        let h = headers(&[("authorization", "Bearer   abc  ")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("abc"));
    }

    #[test]
    fn whitespace_bearer_yields_nothing_even_with_cookie() {
        let h = headers(&[("authorization", "Bearer    "), ("cookie", "Token=fromcookie")]);
        assert_eq!(extract_credential(&h), None);
    }

    #[test]
    fn bare_bearer_falls_back_to_cookie() {
        let h = headers(&[("authorization", "Bearer "), ("cookie", "Token=fromcookie")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("fromcookie"));
    }

    #[test]
    fn non_bearer_scheme_falls_back_to_cookie() {
        let h = headers(&[("authorization", "Basic dXNlcjpwdw=="), ("cookie", "Token=c")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("c"));
    }

    #[test]
    fn header_beats_cookie() {
        let h = headers(&[("authorization", "Bearer h"), ("cookie", "Token=c")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("h"));
    }

    #[test]
    fn last_token_cookie_wins() {
        let h = headers(&[("cookie", "Token=first; other=x; token=\"second\"")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("second"));
    }

    #[test]
    fn last_token_cookie_wins_across_headers() {
        let h = headers(&[("cookie", "Token=a"), ("cookie", "session=s; TOKEN=b")]);
        assert_eq!(extract_credential(&h).as_deref(), Some("b"));
    }

    #[test]
    fn unrelated_cookies_yield_nothing() {
        let h = headers(&[("cookie", "session=s; Tokens=x")]);
        assert_eq!(extract_credential(&h), None);
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn admits_read_and_admin() {
        let g = gate();
        let p = admit(&g, &headers(&[("authorization", "Bearer reader")])).await.unwrap();
        assert_eq!(p.subject, "r");
        let p = admit(&g, &headers(&[("cookie", "Token=admin")])).await.unwrap();
        assert_eq!(p.subject, "a");
    }

    #[tokio::test]
    async fn rejections() {
        let g = gate();
        assert_eq!(
            admit(&g, &HeaderMap::new()).await,
            Err(Rejection::MissingCredential)
        );
        assert_eq!(
            admit(&g, &headers(&[("authorization", "Bearer nope")])).await,
            Err(Rejection::InvalidCredential(AuthError::Unknown))
        );
        assert_eq!(
            admit(&g, &headers(&[("authorization", "Bearer writer")])).await,
            Err(Rejection::InsufficientPermission { subject: "w".into() })
        );
    }

    struct Stalled;

    #[async_trait]
    impl Authenticator for Stalled {
        async fn authenticate(&self, _token: &str) -> Result<Principal, AuthError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(AuthError::Unavailable("never".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_authenticator_times_out() {
        let g = GateState::new(Arc::new(Stalled), AdmissionPolicy::default(), Duration::from_millis(50));
        assert_eq!(
            admit(&g, &headers(&[("authorization", "Bearer x")])).await,
            Err(Rejection::Timeout)
        );
    }

    #[test]
    fn unauthorized_response_shape() {
        let resp = unauthorized();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "0");
        assert_eq!(resp.headers()[CONNECTION], "close");
    }
}
