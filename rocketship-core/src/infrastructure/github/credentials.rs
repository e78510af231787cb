//! GitHub App credentials: App JWT minting and cached installation tokens

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::errors::GitHubAppError;
use super::{API_VERSION, USER_AGENT};
use crate::config::GitHubAppConfig;

/// The App JWT is backdated to absorb clock drift with GitHub.
const ASSERTION_BACKDATE_SECONDS: i64 = 60;
/// GitHub rejects App JWTs that live longer than ten minutes.
const ASSERTION_LIFETIME_SECONDS: i64 = 600;

/// Claims of the App JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Mints App JWTs and exchanges them for installation tokens.
///
/// Installation tokens are cached per installation id behind a reader/writer lock.
/// Two callers refreshing the same installation at once may both hit GitHub; both
/// tokens are valid and the later write wins.
pub struct GitHubAppCredentials {
    app_id: String,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    api_base_url: String,
    refresh_skew: Duration,
    cache: Arc<RwLock<HashMap<i64, CachedToken>>>,
}

impl GitHubAppCredentials {
    /// Build credentials from configuration. Fails when the App id or key is missing.
    pub fn from_config(
        config: &GitHubAppConfig,
        http: reqwest::Client,
    ) -> Result<Self, GitHubAppError> {
        if !config.is_configured() {
            return Err(GitHubAppError::NotConfigured);
        }
        let pem = config
            .private_key_pem
            .as_deref()
            .ok_or(GitHubAppError::NotConfigured)?;

        Self::new(
            config.app_id.trim(),
            pem,
            &config.api_base_url,
            http,
            Duration::seconds(config.token_refresh_skew_seconds as i64),
        )
    }

    pub fn new(
        app_id: &str,
        private_key_pem: &str,
        api_base_url: &str,
        http: reqwest::Client,
        refresh_skew: Duration,
    ) -> Result<Self, GitHubAppError> {
        // Keys pasted into env vars often carry literal "\n" sequences
        let pem = private_key_pem.replace("\\n", "\n");
        let encoding_key = EncodingKey::from_rsa_pem(pem.trim().as_bytes()).map_err(|e| {
            GitHubAppError::InvalidPrivateKey {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            app_id: app_id.to_string(),
            encoding_key,
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            refresh_skew,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Mint a fresh RS256 App JWT. Never cached.
    pub fn mint_application_assertion(&self) -> Result<String, GitHubAppError> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - ASSERTION_BACKDATE_SECONDS,
            exp: now + ASSERTION_LIFETIME_SECONDS,
            iss: self.app_id.clone(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign GitHub App JWT");
            GitHubAppError::Signing {
                message: e.to_string(),
            }
        })
    }

    /// Return an installation token, refreshing it when it expires within the refresh skew.
    #[instrument(skip(self))]
    pub async fn installation_token(&self, installation_id: i64) -> Result<String, GitHubAppError> {
        if let Some(token) = self.cached_token(installation_id).await {
            debug!(installation_id, "Using cached installation token");
            return Ok(token);
        }

        let fresh = self.exchange_token(installation_id).await?;
        let token = fresh.token.clone();

        self.cache.write().await.insert(installation_id, fresh);
        Ok(token)
    }

    /// Drop a cached token, e.g. after GitHub rejected it
    pub async fn invalidate(&self, installation_id: i64) {
        self.cache.write().await.remove(&installation_id);
    }

    async fn cached_token(&self, installation_id: i64) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(&installation_id)
            .filter(|cached| Utc::now() + self.refresh_skew < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    async fn exchange_token(&self, installation_id: i64) -> Result<CachedToken, GitHubAppError> {
        let assertion = self.mint_application_assertion()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, installation_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(assertion)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| GitHubAppError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            warn!(
                installation_id,
                status = status.as_u16(),
                "Installation token exchange rejected"
            );
            return Err(GitHubAppError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AccessTokenResponse =
            response.json().await.map_err(|e| GitHubAppError::Decode {
                message: e.to_string(),
            })?;

        info!(
            installation_id,
            expires_at = %parsed.expires_at,
            "Minted installation token"
        );

        Ok(CachedToken {
            token: parsed.token,
            expires_at: parsed.expires_at,
        })
    }
}
