//! Key Derivation
//!
//! - `loader` - resolves the root key and operating mode at startup
//! - `path` - maps `(customerId, loanId)` onto a BIP86 path
//! - `extended` - immutable BIP32 extended keys and child derivation

pub mod extended;
pub mod loader;
pub mod path;

pub use extended::{ChainCode, ExtendedKey, Fingerprint, KeyMaterial};
pub use loader::{load_root_key, Advisory, KeyMaterialConfig, LoadedRoot, Mode};
pub use path::{
    build_path, checked_index, ChildIndex, CustodyRequest, DerivationPath, HARDENED_OFFSET,
};
