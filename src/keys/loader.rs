//! Key Material Loader
//!
//! Resolves the root key once at startup and fixes the operating mode:
//!
//! 1. **Account xpub** (preferred): an `m/86'/0'/0'` extended public key. The
//!    server never sees a private key and only derives the two non-hardened
//!    levels.
//! 2. **Seed phrase** (fallback): a BIP39 mnemonic with an empty passphrase.
//!    The server holds the master private key and walks the full path.
//!
//! An `xprv` supplied in place of the xpub still works, but is reported as an
//! [`Advisory::InsecureConfiguration`].

use std::fmt;
use std::str::FromStr;

use bip39::{Language, Mnemonic};
use serde::Serialize;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::extended::ExtendedKey;
use crate::custody::CustodyError;

/// Operating mode, fixed for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Root is an account-level key; only non-hardened derivation is performed
    PublicOnly,
    /// Root is the BIP32 master private key derived from a seed phrase
    SeedHolding,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::PublicOnly => "public-only",
            Mode::SeedHolding => "seed-holding",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public-only" => Ok(Mode::PublicOnly),
            "seed-holding" => Ok(Mode::SeedHolding),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Non-fatal findings about the configured key material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// The configured "public" account key actually carries a private scalar
    InsecureConfiguration,
}

/// Key material handed to the loader. Secrets are redacted from `Debug`.
#[derive(Clone, Default)]
pub struct KeyMaterialConfig {
    /// Base58 account-level extended key; takes precedence over the mnemonic
    pub account_xpub: Option<String>,
    /// BIP39 mnemonic phrase
    pub mnemonic: Option<Zeroizing<String>>,
}

impl KeyMaterialConfig {
    pub fn from_xpub(xpub: impl Into<String>) -> Self {
        Self {
            account_xpub: Some(xpub.into()),
            mnemonic: None,
        }
    }

    pub fn from_mnemonic(phrase: impl Into<String>) -> Self {
        Self {
            account_xpub: None,
            mnemonic: Some(Zeroizing::new(phrase.into())),
        }
    }

    /// Whether any usable key material is present
    pub fn is_configured(&self) -> bool {
        non_blank(self.account_xpub.as_deref()).is_some()
            || non_blank(self.mnemonic.as_deref().map(String::as_str)).is_some()
    }
}

impl fmt::Debug for KeyMaterialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialConfig")
            .field("account_xpub", &self.account_xpub.as_ref().map(|_| "<set>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Result of loading the root key
#[derive(Debug, Clone)]
pub struct LoadedRoot {
    pub key: ExtendedKey,
    pub mode: Mode,
    pub advisories: Vec<Advisory>,
}

/// Resolve the root key and mode from configuration
pub fn load_root_key(config: &KeyMaterialConfig) -> Result<LoadedRoot, CustodyError> {
    if let Some(xpub) = non_blank(config.account_xpub.as_deref()) {
        let key = ExtendedKey::from_base58(xpub)?;

        let mut advisories = Vec::new();
        if key.is_private() {
            warn!(
                target: "loanvault::keys",
                "configured account key contains a private key; use the xpub only"
            );
            advisories.push(Advisory::InsecureConfiguration);
        }

        info!(
            target: "loanvault::keys",
            mode = %Mode::PublicOnly,
            depth = key.depth(),
            fingerprint = %hex::encode(key.fingerprint()),
            "loaded account key"
        );

        return Ok(LoadedRoot {
            key,
            mode: Mode::PublicOnly,
            advisories,
        });
    }

    if let Some(phrase) = non_blank(config.mnemonic.as_deref().map(String::as_str)) {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| CustodyError::InvalidKeyMaterial(format!("mnemonic: {}", e)))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let key = ExtendedKey::new_master(&seed[..])?;

        info!(
            target: "loanvault::keys",
            mode = %Mode::SeedHolding,
            fingerprint = %hex::encode(key.fingerprint()),
            "loaded master key from seed phrase"
        );

        return Ok(LoadedRoot {
            key,
            mode: Mode::SeedHolding,
            advisories: Vec::new(),
        });
    }

    Err(CustodyError::Configuration)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
