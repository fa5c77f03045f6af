//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, LoanVaultConfig};
pub use error::{LoanVaultError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_address_event,
    log_security_event, EventCategory, LogEvent, LogLevel, LoggingError,
};
