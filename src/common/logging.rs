//! Structured Logging for LoanVault
//!
//! Provides structured logging with:
//! - JSON output for log aggregation
//! - Correlation IDs for request tracing
//! - Address issuance and security event records
//!
//! Secret material (seed phrase, xprv, private scalars) is never logged.
//!
//! # Usage
//!
//! ```rust,ignore
//! use loanvault::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! info!(target: "loanvault::api", customer_id, loan_id, "issued address");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::config::LoanVaultConfig;

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Deposit address issuance
    Address,
    /// Key configuration and validation failures
    Security,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_str().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Log a security-related event
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );

    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    if success {
        tracing::info!(target: "loanvault::security", "{}", event.to_json());
    } else {
        tracing::warn!(target: "loanvault::security", "{}", event.to_json());
    }
}

/// Log an issued (or failed) deposit address
pub fn log_address_event(
    customer_id: u32,
    loan_id: u32,
    path: &str,
    internal_key: Option<&str>,
    error: Option<(&str, &str)>,
    correlation_id: &str,
) {
    let level = if error.is_none() {
        LogLevel::Info
    } else {
        LogLevel::Error
    };

    let mut event = LogEvent::new(level, EventCategory::Address, "deposit_address")
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "customer_id": customer_id,
            "loan_id": loan_id,
            "path": path,
            "internal_key": internal_key,
        }));

    if let Some((code, message)) = error {
        event = event.with_error(code, message);
        tracing::error!(target: "loanvault::custody", "{}", event.to_json());
    } else {
        tracing::info!(target: "loanvault::custody", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "loanvault={lvl},tower_http={lvl},axum={lvl}",
            lvl = level.as_str()
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from LoanVaultConfig
pub fn init_from_config(config: &LoanVaultConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
