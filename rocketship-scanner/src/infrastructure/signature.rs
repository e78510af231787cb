//! GitHub webhook signature verification (`X-Hub-Signature-256`)

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";

const DIGEST_LEN: usize = 32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature must start with sha256=")]
    MissingPrefix,

    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("signature has the wrong length")]
    InvalidLength,

    #[error("webhook secret is not a usable HMAC key")]
    InvalidKey,

    #[error("signature does not match")]
    Mismatch,
}

fn digest(secret: &str, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `sha256=<hex>` signature of `body`, as GitHub computes it
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest(secret, body)?)))
}

/// Check a signature header against the raw request body in constant time
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;
    let provided_hex = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::MissingPrefix)?;
    let provided = hex::decode(provided_hex).map_err(|_| SignatureError::InvalidHex)?;
    if provided.len() != DIGEST_LEN {
        return Err(SignatureError::InvalidLength);
    }

    let expected = digest(secret, body)?;
    if bool::from(provided.ct_eq(&expected)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
