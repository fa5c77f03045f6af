//! LoanVault - Deterministic Taproot Deposit Addresses
//!
//! Issues one Bitcoin deposit address per `(customerId, loanId)` pair for a
//! collateralised lending platform, without storing per-loan secrets.
//!
//! ## Pipeline
//!
//! 1. **Key loader** (`keys::loader`) - account xpub (public-only) or BIP39 seed (seed-holding)
//! 2. **Path builder** (`keys::path`) - `m/86'/0'/0'/customerId/loanId`
//! 3. **BIP32 engine** (`keys::extended`) - walks the path to the leaf key
//! 4. **Taproot tweak** (`taproot`) - BIP341 key-path-only output key
//! 5. **Address encoder** (`address`) - bech32m witness v1, `bc1p...`
//!
//! ## Around it
//!
//! - `custody` - the generator plus the address book service
//! - `storage` - append-only binding store (SQLite / in-memory)
//! - `price` - cached BTC/AUD price
//! - `api` - axum HTTP surface

pub mod address;
pub mod api;
pub mod common;
pub mod custody;
pub mod keys;
pub mod price;
pub mod storage;
pub mod taproot;

// Re-exports: core pipeline
pub use address::{decode_p2tr, encode_p2tr, TaprootAddress};
pub use custody::{
    AddressGenerator, CustodyError, CustodyService, DerivationFailure, GeneratedAddress,
    KeyDeriver, LocalDeriver,
};
pub use keys::{
    build_path, load_root_key, Advisory, ChildIndex, CustodyRequest, DerivationPath, ExtendedKey,
    KeyMaterialConfig, LoadedRoot, Mode,
};
pub use taproot::{derive_taproot_output, TaprootOutput};

// Re-exports: service
pub use common::{LoanVaultConfig, LoanVaultError};
pub use price::{CoinGeckoSource, PriceCache, Quote};
pub use storage::{AddressBinding, AddressBook, MemoryAddressBook, SqliteAddressBook};
