//! Infrastructure Layer - External concerns and implementations
//!
//! GitHub App access, suite file parsing and reconciliation store backends.

pub mod discovery;
pub mod github;
pub mod parsers;

pub use discovery::{InMemoryReconciliationStore, SqlxReconciliationStore};
pub use github::{GitHubAppClient, GitHubAppCredentials, RepositoryContentClient};
pub use parsers::{RocketshipSuite, SuiteParseError, SuiteYamlParser};
