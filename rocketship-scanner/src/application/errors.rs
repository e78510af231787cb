//! Application-level errors returned by the use cases

use thiserror::Error;

use rocketship_core::domain::discovery::{OrganizationId, StoreError};
use rocketship_core::infrastructure::github::ContentError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplicationError {
    #[error("GitHub App is not configured")]
    NotConfigured,

    #[error("GitHub App is not installed for organization {organization_id}")]
    NotInstalled { organization_id: OrganizationId },

    #[error("Installation {installation_id} not found")]
    InstallationNotFound { installation_id: i64 },

    #[error("Repository {repository} is not accessible to the installation")]
    RepositoryNotFound { repository: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("GitHub request failed: {0}")]
    Upstream(#[from] ContentError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl ApplicationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
