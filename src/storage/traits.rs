//! Storage Trait Definitions
//!
//! The address book persists the `(customerId, loanId) -> address` binding.
//! Bindings are append-only: never updated, never deleted, never reassigned.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::keys::Mode;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The pair or the address is already bound to something else
    #[error("Binding conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A stored deposit address for one loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBinding {
    pub customer_id: u32,
    pub loan_id: u32,
    pub address: String,
    pub path: String,
    pub internal_key: String,
    /// Mode the address was derived in
    pub mode: Mode,
    /// Unix seconds
    pub created_at: u64,
}

impl AddressBinding {
    /// Same pair bound to the same address
    pub fn same_binding(&self, other: &AddressBinding) -> bool {
        self.customer_id == other.customer_id
            && self.loan_id == other.loan_id
            && self.address == other.address
    }
}

/// Address book interface
///
/// Implementations:
/// - `SqliteAddressBook` - Production storage with SQLite
/// - `MemoryAddressBook` - In-memory storage for testing and development
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Insert a binding
    ///
    /// Re-inserting an identical binding returns the stored one. Binding the
    /// pair or the address to anything else fails with `Conflict`.
    async fn insert(&self, binding: AddressBinding) -> StorageResult<AddressBinding>;

    /// Get the binding for a pair
    async fn get(&self, customer_id: u32, loan_id: u32) -> StorageResult<Option<AddressBinding>>;

    /// Reverse lookup by address
    async fn get_by_address(&self, address: &str) -> StorageResult<Option<AddressBinding>>;

    /// All bindings for a customer, ordered by loan id
    async fn list_for_customer(&self, customer_id: u32) -> StorageResult<Vec<AddressBinding>>;

    /// Number of bindings
    async fn count(&self) -> StorageResult<usize>;
}
