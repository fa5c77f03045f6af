//! Storage Layer Module
//!
//! Persists the `(customerId, loanId) -> address` bindings.
//!
//! This module contains:
//! - The `AddressBook` trait
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryAddressBook;
pub use sqlite::SqliteAddressBook;
pub use traits::{AddressBinding, AddressBook, StorageError, StorageResult};
