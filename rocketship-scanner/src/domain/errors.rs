//! Scanner errors

use thiserror::Error;

use rocketship_core::domain::discovery::StoreError;
use rocketship_core::infrastructure::github::ContentError;
use rocketship_core::infrastructure::parsers::SuiteParseError;

use super::value_objects::ScanTransitionError;

/// Errors raised while scanning a repository
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("invalid repository: {message}")]
    InvalidRepository { message: String },

    #[error("{0}")]
    Content(#[from] ContentError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Parse(#[from] SuiteParseError),

    #[error("{0}")]
    Transition(#[from] ScanTransitionError),
}
