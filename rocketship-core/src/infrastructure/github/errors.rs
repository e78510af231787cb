//! GitHub integration errors

use thiserror::Error;

/// Errors raised while minting App JWTs or installation tokens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GitHubAppError {
    #[error("GitHub App is not configured")]
    NotConfigured,

    #[error("Invalid GitHub App private key: {message}")]
    InvalidPrivateKey { message: String },

    #[error("Failed to sign GitHub App JWT: {message}")]
    Signing { message: String },

    #[error("GitHub request failed: {message}")]
    Http { message: String },

    #[error("Installation token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Failed to decode GitHub response: {message}")]
    Decode { message: String },
}

/// Errors raised by repository content operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("GitHub rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    #[error("GitHub returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("GitHub request failed: {message}")]
    Http { message: String },

    #[error("Failed to decode GitHub response: {message}")]
    Decode { message: String },

    #[error("Credential error: {0}")]
    Credentials(#[from] GitHubAppError),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ContentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode {
                message: e.to_string(),
            }
        } else {
            Self::Http {
                message: e.to_string(),
            }
        }
    }
}
