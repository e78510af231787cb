//! Scanner domain layer

pub mod entities;
pub mod errors;
pub mod value_objects;
pub mod webhook;

pub use entities::*;
pub use errors::ScanError;
pub use value_objects::*;
pub use webhook::*;
