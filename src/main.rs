//! LoanVault - Deposit Address Service
//!
//! Run modes:
//!   loanvault                          - Show usage
//!   loanvault api [--port <port>]      - Start REST API
//!   loanvault derive <customer> <loan> - Print one deposit address as JSON
//!   loanvault xpub                     - Print the m/86'/0'/0' account xpub

use loanvault::api::{self, AppState};
use loanvault::common::{init_from_config, log_security_event, LoanVaultConfig};
use loanvault::custody::{AddressGenerator, CustodyError, CustodyService};
use loanvault::keys::{checked_index, Advisory};
use loanvault::price::{CoinGeckoSource, PriceCache};
use loanvault::storage::{AddressBook, MemoryAddressBook, SqliteAddressBook};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match LoanVaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args[1].as_str() {
        "api" => run_api_server(config, &args[2..]).await,
        "derive" => run_derive(config, &args[2..]),
        "xpub" => run_export_xpub(config),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Err("unknown command".to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("LoanVault - Taproot Deposit Addresses");
    println!();
    println!("Usage:");
    println!("  loanvault api [--port <port>]              Start REST API server (default: 8081)");
    println!("  loanvault derive <customerId> <loanId>     Print a deposit address");
    println!("  loanvault xpub                             Print the account xpub");
    println!();
    println!("Environment Variables:");
    println!("  LOANVAULT_XPUB            Account-level xpub (m/86'/0'/0'), preferred");
    println!("  LOANVAULT_SEED            BIP39 seed phrase (fallback)");
    println!("  LOANVAULT_API_PORT        REST API port (default: 8081)");
    println!("  LOANVAULT_DB_PATH         SQLite address book (default: in-memory)");
    println!("  LOANVAULT_PRICE_TTL_SECS  BTC/AUD cache TTL (default: 60)");
    println!("  LOANVAULT_LOG_LEVEL       Log level (default: info)");
}

/// Load the root key, reporting advisories
fn load_generator(config: &LoanVaultConfig) -> Result<AddressGenerator, CustodyError> {
    let generator = AddressGenerator::from_config(&config.keys)?;

    for advisory in generator.advisories() {
        match advisory {
            Advisory::InsecureConfiguration => log_security_event(
                "insecure_key_configuration",
                false,
                serde_json::json!({
                    "reason": "account key contains a private key; configure the xpub instead"
                }),
                None,
            ),
        }
    }

    Ok(generator)
}

fn open_address_book(config: &LoanVaultConfig) -> Result<Arc<dyn AddressBook>, String> {
    match &config.db_path {
        Some(path) => {
            let book = SqliteAddressBook::new(path)
                .map_err(|e| format!("failed to open address book: {}", e))?;
            info!(target: "loanvault::api", path = %path.display(), "using SQLite address book");
            Ok(Arc::new(book))
        }
        None => {
            warn!(target: "loanvault::api", "no database configured, bindings are kept in memory");
            Ok(Arc::new(MemoryAddressBook::new()))
        }
    }
}

/// Start REST API server
async fn run_api_server(config: LoanVaultConfig, args: &[String]) -> Result<(), String> {
    init_from_config(&config).map_err(|e| e.to_string())?;

    let mut port = config.api_port;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = args[i + 1]
                    .parse()
                    .map_err(|_| format!("invalid port: {}", args[i + 1]))?;
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.print_summary();

    // missing key material disables address issuance, not the whole server
    let custody = match load_generator(&config) {
        Ok(generator) => {
            let book = open_address_book(&config)?;
            Some(CustodyService::new(Arc::new(generator), book))
        }
        Err(CustodyError::Configuration) => {
            warn!(target: "loanvault::api", "no key material configured, address endpoints will return 503");
            None
        }
        Err(e) => return Err(e.to_string()),
    };

    let source = CoinGeckoSource::new(&config.price_url).map_err(|e| e.to_string())?;
    let prices = PriceCache::with_system_clock(Arc::new(source), config.price_ttl);

    let state = Arc::new(AppState {
        custody,
        prices: Arc::new(prices),
    });

    api::start_server(state, port)
        .await
        .map_err(|e| format!("API server error: {}", e))
}

/// Print one deposit address without touching the address book
fn run_derive(config: LoanVaultConfig, args: &[String]) -> Result<(), String> {
    if args.len() < 2 {
        return Err("usage: loanvault derive <customerId> <loanId>".to_string());
    }

    let parse = |field: &'static str, raw: &str| -> Result<u32, String> {
        let value: i64 = raw
            .parse()
            .map_err(|_| format!("{} must be an integer, got {}", field, raw))?;
        checked_index(field, value).map_err(|e| e.to_string())
    };
    let customer_id = parse("customerId", &args[0])?;
    let loan_id = parse("loanId", &args[1])?;

    let generator = load_generator(&config).map_err(|e| e.to_string())?;
    let generated = generator
        .generate_address(customer_id, loan_id)
        .map_err(|e| e.to_string())?;

    let output = serde_json::json!({
        "address": generated.address,
        "customerId": customer_id,
        "loanId": loan_id,
        "path": generated.path,
        "internalKey": generated.internal_key,
        "mode": generator.mode(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?
    );

    Ok(())
}

/// Print the account xpub so a seed-holding deployment can move to public-only
fn run_export_xpub(config: LoanVaultConfig) -> Result<(), String> {
    let generator = load_generator(&config).map_err(|e| e.to_string())?;
    let xpub = generator.account_xpub().map_err(|e| e.to_string())?;
    println!("{}", xpub);
    Ok(())
}
