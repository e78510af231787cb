//! Configuration validation module

use crate::config::{DatabaseConfig, GitHubAppConfig, LoggingConfig, ScannerConfig, ServerConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Database configuration error: {message}")]
    Database { message: String },

    #[error("GitHub App configuration error: {message}")]
    GitHubApp { message: String },

    #[error("Scanner configuration error: {message}")]
    Scanner { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn github_app(message: impl Into<String>) -> Self {
        Self::GitHubApp {
            message: message.into(),
        }
    }

    pub fn scanner(message: impl Into<String>) -> Self {
        Self::Scanner {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // u16 cannot exceed 65535, so only 0 is out of range
        if self.port == 0 {
            return Err(ValidationError::server(format!(
                "Port must be in range 1-65535, got {}",
                self.port
            )));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server(
                "Request timeout must be greater than 0",
            ));
        }

        if self.scan_timeout_seconds == 0 {
            return Err(ValidationError::server("Scan timeout must be greater than 0"));
        }

        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::database("Database URL cannot be empty"));
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::database(
                "Database URL must start with postgres:// or postgresql://",
            ));
        }

        if self.max_connections == 0 {
            return Err(ValidationError::database(
                "Max connections must be greater than 0",
            ));
        }

        if let Some(min_idle) = self.min_idle
            && min_idle > self.max_connections
        {
            return Err(ValidationError::database(format!(
                "min_idle ({}) cannot exceed max_connections ({})",
                min_idle, self.max_connections
            )));
        }

        Ok(())
    }
}

impl Validate for GitHubAppConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        url::Url::parse(&self.api_base_url).map_err(|e| {
            ValidationError::github_app(format!(
                "api_base_url '{}' is not a valid URL: {}",
                self.api_base_url, e
            ))
        })?;

        url::Url::parse(&self.web_base_url).map_err(|e| {
            ValidationError::github_app(format!(
                "web_base_url '{}' is not a valid URL: {}",
                self.web_base_url, e
            ))
        })?;

        if self.timeout_seconds == 0 {
            return Err(ValidationError::github_app(
                "timeout_seconds must be greater than 0",
            ));
        }

        if !self.app_id.trim().is_empty() && !self.app_id.trim().chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::github_app(format!(
                "app_id must be numeric, got '{}'",
                self.app_id
            )));
        }

        Ok(())
    }
}

impl Validate for ScannerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_suite_file_bytes == 0 {
            return Err(ValidationError::scanner(
                "max_suite_file_bytes must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.as_str() {
            "json" | "pretty" | "compact" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "Unsupported log format '{}', expected json, pretty or compact",
                other
            ))),
        }
    }
}
