//! Discovery domain module
//!
//! Contains entities, value objects, errors, and the store trait used to mirror
//! `.rocketship` suite definitions into relational rows.

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;
