//! Scanner application layer

pub mod classifier;
pub mod errors;
pub mod scanner;
pub mod use_cases;

pub use errors::ApplicationError;
pub use scanner::Scanner;
pub use use_cases::*;
