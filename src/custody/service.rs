//! Custody Service
//!
//! Issues deposit addresses and records them in the address book. A pair is
//! derived once; afterwards the stored binding is returned as-is.

use std::sync::Arc;

use tracing::warn;

use super::generator::AddressGenerator;
use crate::common::error::Result;
use crate::common::logging::{generate_correlation_id, log_address_event};
use crate::keys::{CustodyRequest, Mode};
use crate::storage::{AddressBinding, AddressBook};

/// Address generator plus the append-only binding store
#[derive(Clone)]
pub struct CustodyService {
    generator: Arc<AddressGenerator>,
    book: Arc<dyn AddressBook>,
}

impl CustodyService {
    pub fn new(generator: Arc<AddressGenerator>, book: Arc<dyn AddressBook>) -> Self {
        Self { generator, book }
    }

    pub fn generator(&self) -> &AddressGenerator {
        &self.generator
    }

    pub fn mode(&self) -> Mode {
        self.generator.mode()
    }

    /// Return the binding for a pair, deriving and storing it on first use
    pub async fn issue_address(&self, customer_id: u32, loan_id: u32) -> Result<AddressBinding> {
        let request = CustodyRequest::new(customer_id, loan_id)?;

        if let Some(existing) = self.book.get(customer_id, loan_id).await? {
            if existing.mode != self.mode() {
                warn!(
                    target: "loanvault::custody",
                    customer_id,
                    loan_id,
                    stored_mode = %existing.mode,
                    current_mode = %self.mode(),
                    "returning binding issued under a different mode"
                );
            }
            return Ok(existing);
        }

        let correlation_id = generate_correlation_id();
        let generated = match self.generator.generate_address(customer_id, loan_id) {
            Ok(generated) => generated,
            Err(e) => {
                log_address_event(
                    customer_id,
                    loan_id,
                    &request.audit_path().to_string(),
                    None,
                    Some((e.error_code(), &e.to_string())),
                    &correlation_id,
                );
                return Err(e.into());
            }
        };

        let binding = AddressBinding {
            customer_id,
            loan_id,
            address: generated.address.into_string(),
            path: generated.path,
            internal_key: generated.internal_key,
            mode: self.mode(),
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
        };

        // a concurrent request for the same pair derives the same address,
        // so the store hands back whichever insert landed first
        let stored = self.book.insert(binding).await?;

        log_address_event(
            customer_id,
            loan_id,
            &stored.path,
            Some(&stored.internal_key),
            None,
            &correlation_id,
        );

        Ok(stored)
    }

    /// Stored binding for a pair, if one was issued
    pub async fn lookup(&self, customer_id: u32, loan_id: u32) -> Result<Option<AddressBinding>> {
        CustodyRequest::new(customer_id, loan_id)?;
        Ok(self.book.get(customer_id, loan_id).await?)
    }

    /// All bindings issued to a customer
    pub async fn addresses_for_customer(&self, customer_id: u32) -> Result<Vec<AddressBinding>> {
        Ok(self.book.list_for_customer(customer_id).await?)
    }

    /// Reverse lookup from a deposit address
    pub async fn owner_of(&self, address: &str) -> Result<Option<AddressBinding>> {
        Ok(self.book.get_by_address(address).await?)
    }
}
