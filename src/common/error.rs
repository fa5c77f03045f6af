//! Common Error Types for LoanVault
//!
//! Rolls the per-module errors up into one type for the service and API layers.

use thiserror::Error;

use crate::custody::CustodyError;
use crate::price::PriceError;
use crate::storage::StorageError;

/// Root error type for LoanVault
#[derive(Debug, Error)]
pub enum LoanVaultError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Key loading, derivation and encoding errors
    #[error(transparent)]
    Custody(#[from] CustodyError),

    /// Address book errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Price source errors
    #[error("price error: {0}")]
    Price(#[from] PriceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoanVaultError {
    /// Transient failures worth retrying
    ///
    /// Derivation is deterministic, so custody errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoanVaultError::Price(_)
                | LoanVaultError::Io(_)
                | LoanVaultError::Storage(StorageError::Connection(_))
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            LoanVaultError::Config(_) => "CONFIG_ERROR",
            LoanVaultError::Logging(_) => "LOGGING_ERROR",
            LoanVaultError::Custody(e) => e.error_code(),
            LoanVaultError::Storage(StorageError::Conflict(_)) => "BINDING_CONFLICT",
            LoanVaultError::Storage(StorageError::NotFound(_)) => "NOT_FOUND",
            LoanVaultError::Storage(_) => "STORAGE_ERROR",
            LoanVaultError::Price(_) => "PRICE_UNAVAILABLE",
            LoanVaultError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using LoanVaultError
pub type Result<T> = std::result::Result<T, LoanVaultError>;
