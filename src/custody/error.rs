//! Errors for the address derivation pipeline
//!
//! Every failure is deterministic for a given root key and request, so none of
//! these are retryable.

use thiserror::Error;

/// Why a single BIP32 child derivation step could not produce a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationFailure {
    /// Hardened index requested on a parent that only holds a public point
    HardenedFromPublic,
    /// IL >= n, or the child key is zero / the point at infinity
    InvalidIntermediate,
    /// Child would exceed depth 255
    MaxDepthExceeded,
}

impl std::fmt::Display for DerivationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DerivationFailure::HardenedFromPublic => {
                write!(f, "hardened derivation requires a private key")
            }
            DerivationFailure::InvalidIntermediate => {
                write!(f, "derived an invalid intermediate key")
            }
            DerivationFailure::MaxDepthExceeded => write!(f, "maximum key depth exceeded"),
        }
    }
}

/// Errors surfaced by key loading, derivation and address encoding
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("no key material configured (set an account xpub or a seed phrase)")]
    Configuration,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("invalid {field}: {value} (must be in 0..2^31)")]
    InvalidIndex { field: &'static str, value: i64 },

    #[error("derivation failed: {0}")]
    Derivation(DerivationFailure),

    #[error("address encoding failed: {0}")]
    Encoding(String),
}

impl From<DerivationFailure> for CustodyError {
    fn from(failure: DerivationFailure) -> Self {
        CustodyError::Derivation(failure)
    }
}

impl CustodyError {
    /// Stable code for API responses and structured logs
    pub fn error_code(&self) -> &'static str {
        match self {
            CustodyError::Configuration => "CONFIGURATION_ERROR",
            CustodyError::InvalidKeyMaterial(_) => "INVALID_KEY_MATERIAL",
            CustodyError::InvalidIndex { .. } => "INVALID_INDEX",
            CustodyError::Derivation(_) => "DERIVATION_FAILURE",
            CustodyError::Encoding(_) => "ENCODING_FAILURE",
        }
    }

    /// Errors caused by the caller's input rather than by the deployment
    pub fn is_client_error(&self) -> bool {
        matches!(self, CustodyError::InvalidIndex { .. })
    }
}
