//! In-Memory Address Book
//!
//! Used for tests and for deployments without a database path.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{AddressBinding, AddressBook, StorageError, StorageResult};

#[derive(Default)]
struct Tables {
    /// Bindings keyed by (customer, loan)
    bindings: BTreeMap<(u32, u32), AddressBinding>,
    /// Index: address -> (customer, loan)
    by_address: HashMap<String, (u32, u32)>,
}

/// In-memory address book
///
/// Both indexes sit behind one lock so an insert is checked and applied
/// atomically.
#[derive(Clone, Default)]
pub struct MemoryAddressBook {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryAddressBook {
    /// Create a new empty book
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressBook for MemoryAddressBook {
    async fn insert(&self, binding: AddressBinding) -> StorageResult<AddressBinding> {
        let mut tables = self.tables.write().await;
        let key = (binding.customer_id, binding.loan_id);

        if let Some(existing) = tables.bindings.get(&key) {
            if existing.same_binding(&binding) {
                return Ok(existing.clone());
            }
            return Err(StorageError::Conflict(format!(
                "customer {} loan {} is bound to {}",
                key.0, key.1, existing.address
            )));
        }

        if let Some(owner) = tables.by_address.get(&binding.address) {
            return Err(StorageError::Conflict(format!(
                "address {} is bound to customer {} loan {}",
                binding.address, owner.0, owner.1
            )));
        }

        tables.by_address.insert(binding.address.clone(), key);
        tables.bindings.insert(key, binding.clone());

        Ok(binding)
    }

    async fn get(&self, customer_id: u32, loan_id: u32) -> StorageResult<Option<AddressBinding>> {
        let tables = self.tables.read().await;
        Ok(tables.bindings.get(&(customer_id, loan_id)).cloned())
    }

    async fn get_by_address(&self, address: &str) -> StorageResult<Option<AddressBinding>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_address
            .get(address)
            .and_then(|key| tables.bindings.get(key))
            .cloned())
    }

    async fn list_for_customer(&self, customer_id: u32) -> StorageResult<Vec<AddressBinding>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bindings
            .range((customer_id, 0)..=(customer_id, u32::MAX))
            .map(|(_, binding)| binding.clone())
            .collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.bindings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Mode;

    fn binding(customer_id: u32, loan_id: u32, address: &str) -> AddressBinding {
        AddressBinding {
            customer_id,
            loan_id,
            address: address.to_string(),
            path: format!("m/86'/0'/0'/{}/{}", customer_id, loan_id),
            internal_key: "00".repeat(32),
            mode: Mode::PublicOnly,
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let book = MemoryAddressBook::new();
        book.insert(binding(1, 2, "bc1p-a")).await.unwrap();

        let found = book.get(1, 2).await.unwrap().unwrap();
        assert_eq!(found.address, "bc1p-a");
        assert!(book.get(2, 1).await.unwrap().is_none());

        let by_address = book.get_by_address("bc1p-a").await.unwrap().unwrap();
        assert_eq!((by_address.customer_id, by_address.loan_id), (1, 2));
        assert_eq!(book.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reinsert_is_idempotent() {
        let book = MemoryAddressBook::new();
        let first = book.insert(binding(1, 2, "bc1p-a")).await.unwrap();

        let mut again = binding(1, 2, "bc1p-a");
        again.created_at += 60;
        let stored = book.insert(again).await.unwrap();

        assert_eq!(stored, first);
        assert_eq!(book.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicts() {
        let book = MemoryAddressBook::new();
        book.insert(binding(1, 2, "bc1p-a")).await.unwrap();

        // same pair, different address
        assert!(matches!(
            book.insert(binding(1, 2, "bc1p-b")).await,
            Err(StorageError::Conflict(_))
        ));

        // same address, different pair
        assert!(matches!(
            book.insert(binding(3, 4, "bc1p-a")).await,
            Err(StorageError::Conflict(_))
        ));

        assert_eq!(book.get(1, 2).await.unwrap().unwrap().address, "bc1p-a");
        assert_eq!(book.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_for_customer() {
        let book = MemoryAddressBook::new();
        book.insert(binding(7, 3, "bc1p-73")).await.unwrap();
        book.insert(binding(7, 1, "bc1p-71")).await.unwrap();
        book.insert(binding(8, 0, "bc1p-80")).await.unwrap();

        let loans: Vec<u32> = book
            .list_for_customer(7)
            .await
            .unwrap()
            .iter()
            .map(|b| b.loan_id)
            .collect();
        assert_eq!(loans, vec![1, 3]);
        assert!(book.list_for_customer(9).await.unwrap().is_empty());
    }
}
