//! Rocketship Core - Foundation crate for the Rocketship control plane
//!
//! This crate provides the pieces shared by the scanner and the server binary:
//!
//! # Modules
//!
//! - [`config`] - Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] - Discovery entities (projects, suites, tests, scan attempts) and the store trait
//! - [`infrastructure`] - GitHub App credentials and content client, suite parser, persistence
//! - [`logging`] - Structured logging with tracing
//!
//! # Architecture
//!
//! ```text
//! rocketship-core/
//! ├── domain/
//! │   └── discovery/    # Entities, value objects, errors, ReconciliationStore
//! ├── infrastructure/
//! │   ├── github/       # App JWT, installation tokens, REST content client
//! │   ├── parsers/      # Suite YAML parser
//! │   └── discovery/    # PostgreSQL and in-memory reconciliation stores
//! └── config/           # Configuration management
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! use rocketship_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `ROCKETSHIP__` prefix with double underscore separators:
//!
//! ```bash
//! ROCKETSHIP__SERVER__PORT=8080
//! ROCKETSHIP__GITHUB_APP__WEBHOOK_SECRET=...
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
