//! Deposit Address Custody
//!
//! - `generator` - `(customerId, loanId) -> address` pipeline and the `KeyDeriver` seam
//! - `service` - issues addresses and records them in the address book
//! - `error` - error taxonomy shared by the key, taproot and address modules

pub mod error;
pub mod generator;
pub mod service;

pub use error::{CustodyError, DerivationFailure};
pub use generator::{AddressGenerator, GeneratedAddress, KeyDeriver, LocalDeriver, ADDRESS_NETWORK};
pub use service::CustodyService;
