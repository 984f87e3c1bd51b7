//! Bearer-token authentication for operator endpoints.
//!
//! Tokens are held only as SHA-256 fingerprints. Accepted credentials:
//! - `Authorization: Bearer <token>`
//! - `X-API-Key: <token>`

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Accepted operator tokens.
    pub api_tokens: HashSet<String>,
    /// When false and no token is configured, protected routes are open.
    pub require_auth: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_tokens: HashSet::new(),
            require_auth: true,
        }
    }
}

impl AuthConfig {
    /// Single-token configuration.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            api_tokens: HashSet::from([token.into()]),
            require_auth: true,
        }
    }
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    fingerprints: Arc<HashSet<String>>,
    require_auth: bool,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        let fingerprints = config
            .api_tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(token_fingerprint)
            .collect();
        Self {
            fingerprints: Arc::new(fingerprints),
            require_auth: config.require_auth,
        }
    }

    #[must_use]
    pub fn validate_token(&self, token: &str) -> bool {
        self.fingerprints.contains(&token_fingerprint(token.trim()))
    }

    #[must_use]
    pub fn require_auth(&self) -> bool {
        self.require_auth
    }

    /// Checks the request headers.
    ///
    /// # Errors
    /// Returns an error when credentials are missing or unknown, or when auth
    /// is required but no token has been configured.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        if self.fingerprints.is_empty() {
            return if self.require_auth {
                Err(AuthError::NotConfigured)
            } else {
                Ok(())
            };
        }

        match extract_auth(headers) {
            Some(AuthMethod::Bearer(token)) | Some(AuthMethod::ApiKey(token)) => {
                if token.is_empty() {
                    warn!("Empty credential");
                    return Err(AuthError::InvalidToken);
                }
                if self.validate_token(&token) {
                    return Ok(());
                }
                let fingerprint = token_fingerprint(token.trim());
                warn!(fingerprint = %&fingerprint[..12], "Rejected unknown token");
                Err(AuthError::InvalidToken)
            }
            None => Err(AuthError::MissingAuth),
        }
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Missing authentication header.
    #[error("Missing authentication")]
    MissingAuth,
    /// Token not recognised.
    #[error("Invalid token")]
    InvalidToken,
    #[error("Authentication is required but no API token is configured")]
    NotConfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingAuth | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Authentication method.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Bearer(String),
    ApiKey(String),
}

/// Extracts credentials from request headers.
pub fn extract_auth(headers: &HeaderMap) -> Option<AuthMethod> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str
            .strip_prefix("Bearer ")
            .or_else(|| auth_str.strip_prefix("bearer "))
    {
        return Some(AuthMethod::Bearer(token.trim().to_string()));
    }

    if let Some(api_key) = headers.get("X-API-Key")
        && let Ok(key) = api_key.to_str()
    {
        return Some(AuthMethod::ApiKey(key.trim().to_string()));
    }

    None
}

/// Rejects the request before the handler runs unless it carries a known token.
pub async fn require_token(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    auth.authorize(&headers)?;
    debug!(path = %request.uri().path(), "Request authorized");
    Ok(next.run(request).await)
}

pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_and_api_key_accepted() {
        let auth = AuthState::new(AuthConfig::with_token("s3cret"));
        assert!(auth.authorize(&headers("Authorization", "Bearer s3cret")).is_ok());
        assert!(auth.authorize(&headers("X-API-Key", "s3cret")).is_ok());
    }

    #[test]
    fn test_rejections() {
        let auth = AuthState::new(AuthConfig::with_token("s3cret"));
        assert_eq!(auth.authorize(&HeaderMap::new()), Err(AuthError::MissingAuth));
        assert_eq!(
            auth.authorize(&headers("Authorization", "Bearer nope")),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            auth.authorize(&headers("Authorization", "Bearer ")),
            Err(AuthError::InvalidToken)
        );
        // Basic auth is not a bearer token.
        assert_eq!(
            auth.authorize(&headers("Authorization", "Basic czNjcmV0")),
            Err(AuthError::MissingAuth)
        );
    }

    #[test]
    fn test_no_tokens_configured() {
        let strict = AuthState::new(AuthConfig::default());
        assert_eq!(strict.authorize(&HeaderMap::new()), Err(AuthError::NotConfigured));

        let open = AuthState::new(AuthConfig {
            api_tokens: HashSet::new(),
            require_auth: false,
        });
        assert!(open.authorize(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(token_fingerprint("a"), token_fingerprint("a"));
        assert_ne!(token_fingerprint("a"), token_fingerprint("b"));
        assert_eq!(token_fingerprint("a").len(), 64);
    }
}
