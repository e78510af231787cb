//! Domain Layer - Core business logic and entities
//!
//! This module contains the discovery model: the projects, suites and tests that
//! mirror `.rocketship` directories, plus the audit records written around scans.

pub mod discovery;

pub use discovery::*;
