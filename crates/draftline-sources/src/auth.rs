//! Authentication strategies for provider clients.
//!
//! Each provider owns one [`AuthProvider`] and asks it for request
//! headers before every call. Public endpoints use [`PublicAuth`],
//! cookie or pre-issued token auth uses [`StaticHeaderAuth`], and
//! token-endpoint flows use [`OAuthRefreshAuth`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use draftline_core::error::AppError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::transport::{Transport, TransportRequest};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to attach to every request for this source.
    async fn headers(&self) -> Result<Vec<(String, String)>, AppError>;

    /// Establishes or renews credentials.
    async fn refresh(&self) -> Result<(), AppError>;

    /// Whether usable credentials are currently held.
    fn is_authenticated(&self) -> bool;
}

// --- Public endpoints ---

/// No credentials at all.
pub struct PublicAuth;

#[async_trait]
impl AuthProvider for PublicAuth {
    async fn headers(&self) -> Result<Vec<(String, String)>, AppError> {
        Ok(Vec::new())
    }

    async fn refresh(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

// --- Static credentials ---

/// Fixed headers handed over at construction. Covers cookie auth and
/// long-lived bearer tokens that are renewed outside the process.
pub struct StaticHeaderAuth {
    headers: Vec<(String, String)>,
}

impl StaticHeaderAuth {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    pub fn bearer(token: &str) -> Self {
        Self::new(vec![("authorization".to_string(), format!("Bearer {token}"))])
    }

    /// Joins the pairs into a single `cookie` header.
    pub fn cookies(pairs: &[(&str, &str)]) -> Self {
        let value = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(vec![("cookie".to_string(), value)])
    }
}

#[async_trait]
impl AuthProvider for StaticHeaderAuth {
    async fn headers(&self) -> Result<Vec<(String, String)>, AppError> {
        Ok(self.headers.clone())
    }

    async fn refresh(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        !self.headers.is_empty()
    }
}

// --- OAuth refresh-token flow ---

/// How long before expiry a token is treated as stale.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct TokenState {
    access_token: Option<String>,
    expires_at: Option<Instant>,
}

/// Exchanges a long-lived refresh token for short-lived access tokens
/// on demand, renewing ahead of expiry.
pub struct OAuthRefreshAuth {
    source: String,
    config: OAuthConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<TokenState>,
}

impl OAuthRefreshAuth {
    pub fn new(source: &str, config: OAuthConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            source: source.to_string(),
            config,
            transport,
            state: Mutex::new(TokenState {
                access_token: None,
                expires_at: None,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(source = %self.source, "token state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Current token if it exists and is not about to expire.
    fn current_token(&self) -> Option<String> {
        let state = self.lock_state();
        match (&state.access_token, state.expires_at) {
            (Some(token), Some(expires_at)) if Instant::now() + EXPIRY_MARGIN < expires_at => {
                Some(token.clone())
            }
            (Some(token), None) => Some(token.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl AuthProvider for OAuthRefreshAuth {
    async fn headers(&self) -> Result<Vec<(String, String)>, AppError> {
        if let Some(token) = self.current_token() {
            return Ok(vec![(
                "authorization".to_string(),
                format!("Bearer {token}"),
            )]);
        }
        self.refresh().await?;
        match self.current_token() {
            Some(token) => Ok(vec![(
                "authorization".to_string(),
                format!("Bearer {token}"),
            )]),
            None => Err(AppError::Auth {
                source_name: self.source.clone(),
                reason: "token refresh produced no usable access token".to_string(),
            }),
        }
    }

    async fn refresh(&self) -> Result<(), AppError> {
        if self.config.refresh_token.is_empty() {
            return Err(AppError::Auth {
                source_name: self.source.clone(),
                reason: "no refresh token configured".to_string(),
            });
        }

        let request = TransportRequest::post_form(
            &self.source,
            self.config.token_url.clone(),
            vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("client_id".to_string(), self.config.client_id.clone()),
                (
                    "client_secret".to_string(),
                    self.config.client_secret.clone(),
                ),
                (
                    "refresh_token".to_string(),
                    self.config.refresh_token.clone(),
                ),
            ],
        );

        let response = self.transport.execute(request).await.map_err(|e| match e {
            // The token endpoint answers 400 for revoked or malformed
            // grants. That is an auth failure, not a transport one.
            AppError::Transport {
                status: Some(400), ..
            } => AppError::Auth {
                source_name: self.source.clone(),
                reason: "token endpoint rejected the refresh grant".to_string(),
            },
            other => other,
        })?;

        let grant: TokenGrant =
            serde_json::from_str(&response.body).map_err(|e| AppError::Auth {
                source_name: self.source.clone(),
                reason: format!("malformed token response: {e}"),
            })?;

        let mut state = self.lock_state();
        state.expires_at = grant
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        state.access_token = Some(grant.access_token);
        info!(source = %self.source, "refreshed oauth access token");
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.current_token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use crate::transport::TransportResponse;

    fn token_body(expires_in: u64) -> String {
        format!(r#"{{"access_token":"tok-1","expires_in":{expires_in},"token_type":"bearer"}}"#)
    }

    fn oauth_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh-1".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
        }
    }

    #[tokio::test]
    async fn public_auth_is_always_ready() {
        let auth = PublicAuth;
        assert!(auth.is_authenticated());
        assert!(auth.headers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_cookies_join_into_one_header() {
        let auth = StaticHeaderAuth::cookies(&[("espn_s2", "abc"), ("SWID", "{123}")]);
        assert!(auth.is_authenticated());
        let headers = auth.headers().await.unwrap();
        assert_eq!(
            headers,
            vec![("cookie".to_string(), "espn_s2=abc; SWID={123}".to_string())]
        );
    }

    #[tokio::test]
    async fn oauth_refreshes_once_and_reuses_the_token() {
        let transport = Arc::new(MockTransport::replying(TransportResponse {
            status: 200,
            body: token_body(3600),
            headers: Vec::new(),
        }));
        let auth = OAuthRefreshAuth::new("yahoo", oauth_config(), transport.clone());

        assert!(!auth.is_authenticated());
        let headers = auth.headers().await.unwrap();
        assert_eq!(
            headers,
            vec![("authorization".to_string(), "Bearer tok-1".to_string())]
        );
        assert!(auth.is_authenticated());

        auth.headers().await.unwrap();
        assert_eq!(transport.calls(), 1);

        let recorded = transport.requests();
        assert_eq!(recorded[0].url, "https://auth.example.com/token");
        assert!(
            recorded[0]
                .form
                .contains(&("grant_type".to_string(), "refresh_token".to_string()))
        );
    }

    #[tokio::test]
    async fn oauth_refreshes_again_when_the_token_is_about_to_expire() {
        // expires_in below the margin means every call refreshes.
        let transport = Arc::new(MockTransport::replying(TransportResponse {
            status: 200,
            body: token_body(1),
            headers: Vec::new(),
        }));
        let auth = OAuthRefreshAuth::new("yahoo", oauth_config(), transport.clone());

        auth.headers().await.unwrap();
        auth.headers().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_a_network_call() {
        let transport = Arc::new(MockTransport::replying(TransportResponse {
            status: 200,
            body: token_body(3600),
            headers: Vec::new(),
        }));
        let mut config = oauth_config();
        config.refresh_token = String::new();
        let auth = OAuthRefreshAuth::new("yahoo", config, transport.clone());

        let err = auth.headers().await.unwrap_err();
        assert!(matches!(err, AppError::Auth { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_grant_maps_to_an_auth_error() {
        let transport = Arc::new(MockTransport::failing(AppError::Transport {
            source_name: "yahoo".to_string(),
            status: Some(400),
            message: "unexpected status 400".to_string(),
            body: Some(r#"{"error":"invalid_grant"}"#.to_string()),
        }));
        let auth = OAuthRefreshAuth::new("yahoo", oauth_config(), transport);

        let err = auth.refresh().await.unwrap_err();
        match err {
            AppError::Auth { reason, .. } => assert!(reason.contains("rejected")),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_token_body_maps_to_an_auth_error() {
        let transport = Arc::new(MockTransport::replying(TransportResponse {
            status: 200,
            body: "not json".to_string(),
            headers: Vec::new(),
        }));
        let auth = OAuthRefreshAuth::new("yahoo", oauth_config(), transport);

        let err = auth.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::Auth { .. }));
    }
}
