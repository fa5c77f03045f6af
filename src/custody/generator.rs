//! Address Generator
//!
//! `GenerateAddress(customerId, loanId)`: build the path for the active mode,
//! walk it from the root, tweak the leaf into a Taproot output key and encode
//! it as a `bc1p...` address. Every step is a pure function of the root key
//! and the request.

use std::sync::Arc;

use bitcoin::Network;
use serde::Serialize;
use tracing::debug;

use super::error::CustodyError;
use crate::address::{decode_p2tr, encode_p2tr, TaprootAddress};
use crate::keys::{
    load_root_key, Advisory, CustodyRequest, DerivationPath, ExtendedKey, KeyMaterialConfig, Mode,
};
use crate::taproot::derive_taproot_output;

/// Network every issued address belongs to
pub const ADDRESS_NETWORK: Network = Network::Bitcoin;

/// Abstracts where the root key lives
///
/// The local implementation walks an in-process root key. A remote signer
/// (HSM, network custody) can implement the same trait without changing
/// the generator.
#[cfg_attr(test, mockall::automock)]
pub trait KeyDeriver: Send + Sync {
    /// Operating mode implied by the root key
    fn mode(&self) -> Mode;

    /// Derive the key at `path` relative to the root
    fn derive(&self, path: &DerivationPath) -> Result<ExtendedKey, CustodyError>;
}

/// Derives from a root key held in memory
pub struct LocalDeriver {
    root: ExtendedKey,
    mode: Mode,
}

impl LocalDeriver {
    pub fn new(root: ExtendedKey, mode: Mode) -> Self {
        Self { root, mode }
    }
}

impl KeyDeriver for LocalDeriver {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn derive(&self, path: &DerivationPath) -> Result<ExtendedKey, CustodyError> {
        self.root.derive_path(path)
    }
}

/// Output of `generate_address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAddress {
    pub address: TaprootAddress,
    /// Canonical `m/86'/0'/0'/c/l`, independent of mode
    pub path: String,
    /// Hex x-only internal key (before the Taproot tweak)
    pub internal_key: String,
}

/// Deterministic `(customerId, loanId) -> address` engine
#[derive(Clone)]
pub struct AddressGenerator {
    deriver: Arc<dyn KeyDeriver>,
    advisories: Vec<Advisory>,
}

impl AddressGenerator {
    pub fn new(deriver: Arc<dyn KeyDeriver>) -> Self {
        Self {
            deriver,
            advisories: Vec::new(),
        }
    }

    /// Load the root key and build a generator backed by it
    pub fn from_config(config: &KeyMaterialConfig) -> Result<Self, CustodyError> {
        let loaded = load_root_key(config)?;
        Ok(Self {
            deriver: Arc::new(LocalDeriver::new(loaded.key, loaded.mode)),
            advisories: loaded.advisories,
        })
    }

    pub fn mode(&self) -> Mode {
        self.deriver.mode()
    }

    /// Advisories raised when the root key was loaded
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Generate the deposit address for a customer's loan
    pub fn generate_address(
        &self,
        customer_id: u32,
        loan_id: u32,
    ) -> Result<GeneratedAddress, CustodyError> {
        let request = CustodyRequest::new(customer_id, loan_id)?;
        let path = request.derivation_path(self.mode());

        let leaf = self.deriver.derive(&path)?.neuter();
        let output = derive_taproot_output(&leaf)?;
        let address = encode_p2tr(&output.output_key, ADDRESS_NETWORK)?;

        // decode must give back exactly what was encoded
        let program = decode_p2tr(address.as_str(), ADDRESS_NETWORK)?;
        if program != output.output_key.serialize() {
            return Err(CustodyError::Encoding(format!(
                "round trip mismatch for {}",
                address
            )));
        }

        let generated = GeneratedAddress {
            address,
            path: request.audit_path().to_string(),
            internal_key: output.internal_key_hex(),
        };

        debug!(
            target: "loanvault::custody",
            customer_id,
            loan_id,
            path = %generated.path,
            internal_key = %generated.internal_key,
            address = %generated.address,
            "derived deposit address"
        );

        Ok(generated)
    }

    /// Base58 xpub for `m/86'/0'/0'`
    ///
    /// In seed-holding mode this is what an operator exports to switch the
    /// deployment to public-only mode; both then issue the same addresses.
    pub fn account_xpub(&self) -> Result<String, CustodyError> {
        let account_path = match self.mode() {
            Mode::SeedHolding => DerivationPath::bip86_account(),
            Mode::PublicOnly => DerivationPath::empty(),
        };
        Ok(self.deriver.derive(&account_path)?.neuter().to_base58())
    }
}

impl std::fmt::Debug for AddressGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressGenerator")
            .field("mode", &self.mode())
            .field("advisories", &self.advisories)
            .finish()
    }
}
