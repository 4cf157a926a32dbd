//! Authentication handling

use crate::gateway::Gateway;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bicameral_core::{AuthConfig, AuthMode, Error, Result};
use std::sync::Arc;
use tracing::warn;

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    pub token: Option<String>,
}

impl ResolvedAuth {
    pub fn from_config(config: &AuthConfig, env_token: Option<String>) -> Self {
        let token = config.token.clone().or(env_token).filter(|t| !t.is_empty());
        Self { mode: config.mode.clone(), token }
    }

    pub fn open() -> Self {
        Self { mode: AuthMode::None, token: None }
    }

    pub fn verify_token(&self, provided: Option<&str>) -> Result<()> {
        match self.mode {
            AuthMode::None => Ok(()),
            AuthMode::Token => {
                let expected = self.token.as_deref().ok_or_else(|| Error::auth_failed("no token configured"))?;
                let provided = provided.ok_or_else(|| Error::auth_failed("token required"))?;
                if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                    return Err(Error::auth_failed("invalid token"));
                }
                Ok(())
            }
        }
    }
}

/// `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// `?token=<token>`, for clients that cannot set headers on a socket upgrade.
pub fn query_token(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

/// Route middleware: bearer header first, then the query parameter.
pub async fn require_auth(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = bearer_token(request.headers()).or_else(|| query_token(request.uri().query()));
    match gateway.auth().verify_token(provided) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            crate::server::ApiError(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_auth() {
        let auth = ResolvedAuth { mode: AuthMode::Token, token: Some("test-token-123".into()) };
        assert!(auth.verify_token(Some("test-token-123")).is_ok());
        assert!(auth.verify_token(Some("wrong-token")).is_err());
        assert!(auth.verify_token(None).is_err());
    }

    #[test]
    fn test_no_auth() {
        let auth = ResolvedAuth::open();
        assert!(auth.verify_token(None).is_ok());
        assert!(auth.verify_token(Some("anything")).is_ok());
    }

    #[test]
    fn token_mode_without_token_rejects_everything() {
        let auth = ResolvedAuth::from_config(&AuthConfig { mode: AuthMode::Token, token: None }, Some(String::new()));
        let err = auth.verify_token(Some("")).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn env_token_fills_in_missing_config() {
        let auth = ResolvedAuth::from_config(&AuthConfig::default(), Some("from-env".into()));
        assert!(auth.verify_token(Some("from-env")).is_ok());
    }

    #[test]
    fn extracts_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(query_token(Some("a=1&token=xyz")), Some("xyz"));
        assert_eq!(query_token(Some("a=1")), None);
        assert_eq!(query_token(None), None);
    }
}
