//! Scanner infrastructure layer

pub mod signature;

pub use signature::{SIGNATURE_HEADER, SignatureError, sign, verify_signature};
