//! Reconciliation store backends

pub mod in_memory_store;
pub mod sqlx_store;

pub use in_memory_store::InMemoryReconciliationStore;
pub use sqlx_store::SqlxReconciliationStore;
