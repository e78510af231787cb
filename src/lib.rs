//! Rocketship control plane - application library
//!
//! Wires the reconciliation store, GitHub App client and scanner into the HTTP router.

mod app;

pub use app::{AppError, AppHandle, build_state, create_app};
pub use rocketship_core::{Config, init_tracing};
pub use rocketship_scanner::presentation::AppState;

pub use rocketship_core;
pub use rocketship_scanner;
