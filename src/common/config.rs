//! Environment-based Configuration for LoanVault
//!
//! Key material is read here once and handed to the key loader as a plain
//! value. Nothing below this module reads the environment.
//!
//! # Environment Variables
//!
//! ## Key Material (one of)
//! - `LOANVAULT_XPUB` - account-level (`m/86'/0'/0'`) extended public key, base58. Takes precedence.
//! - `LOANVAULT_SEED` - BIP39 mnemonic (empty passphrase)
//!
//! `XPUB` and `SEED` are accepted as fallbacks for older deployments.
//!
//! ## Optional Settings
//! - `LOANVAULT_API_PORT` - HTTP port (default: 8081, fallback `PORT`)
//! - `LOANVAULT_DB_PATH` - SQLite address book path (in-memory when unset)
//! - `LOANVAULT_PRICE_TTL_SECS` - BTC/AUD cache lifetime (default: 60)
//! - `LOANVAULT_PRICE_URL` - price endpoint (default: CoinGecko simple price)
//! - `LOANVAULT_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `LOANVAULT_LOG_JSON` - Set to "1" for JSON log lines

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::keys::{KeyMaterialConfig, Mode};

pub const DEFAULT_API_PORT: u16 = 8081;
pub const DEFAULT_PRICE_TTL_SECS: u64 = 60;
pub const DEFAULT_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=aud";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct LoanVaultConfig {
    /// Account xpub and/or seed phrase
    pub keys: KeyMaterialConfig,

    /// HTTP listen port
    pub api_port: u16,

    /// SQLite database for the address book
    pub db_path: Option<PathBuf>,

    /// How long a fetched BTC/AUD price stays fresh
    pub price_ttl: Duration,

    /// Price source endpoint
    pub price_url: String,

    /// Log level
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl LoanVaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |primary: &str, fallback: Option<&str>| {
            lookup(primary)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| fallback.and_then(|name| lookup(name)))
                .filter(|v| !v.trim().is_empty())
        };

        let mut keys = KeyMaterialConfig::default();
        if let Some(xpub) = var("LOANVAULT_XPUB", Some("XPUB")) {
            keys.account_xpub = Some(xpub.trim().to_string());
        }
        if let Some(seed) = var("LOANVAULT_SEED", Some("SEED")) {
            keys.mnemonic = Some(Zeroizing::new(seed));
        }

        let api_port = match var("LOANVAULT_API_PORT", Some("PORT")) {
            Some(port) => port.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue("LOANVAULT_API_PORT".to_string(), port.clone())
            })?,
            None => DEFAULT_API_PORT,
        };

        let price_ttl_secs = match var("LOANVAULT_PRICE_TTL_SECS", None) {
            Some(secs) => secs.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "LOANVAULT_PRICE_TTL_SECS".to_string(),
                    format!("{} (must be whole seconds)", secs),
                )
            })?,
            None => DEFAULT_PRICE_TTL_SECS,
        };

        let db_path = var("LOANVAULT_DB_PATH", None).map(PathBuf::from);
        let price_url =
            var("LOANVAULT_PRICE_URL", None).unwrap_or_else(|| DEFAULT_PRICE_URL.to_string());
        let log_level = var("LOANVAULT_LOG_LEVEL", None).unwrap_or_else(|| "info".to_string());
        let log_json = var("LOANVAULT_LOG_JSON", None)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            keys,
            api_port,
            db_path,
            price_ttl: Duration::from_secs(price_ttl_secs),
            price_url,
            log_level,
            log_json,
        })
    }

    /// Mode the key loader will select, if any key material is present
    pub fn expected_mode(&self) -> Option<Mode> {
        if !self.keys.is_configured() {
            None
        } else if self.keys.account_xpub.is_some() {
            Some(Mode::PublicOnly)
        } else {
            Some(Mode::SeedHolding)
        }
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== LoanVault Configuration ===");
        println!(
            "Key Source: {}",
            match self.expected_mode() {
                Some(Mode::PublicOnly) => "account xpub (public-only)",
                Some(Mode::SeedHolding) => "seed phrase (seed-holding)",
                None => "none (address generation disabled)",
            }
        );
        println!("API Port: {}", self.api_port);
        println!(
            "Address Book: {}",
            self.db_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );
        println!("Price TTL: {}s", self.price_ttl.as_secs());
        println!("Price URL: {}", self.price_url);
        println!("Log Level: {}", self.log_level);
        println!("===============================");
    }
}
