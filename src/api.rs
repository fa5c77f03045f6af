//! REST API for LoanVault
//!
//! Endpoints:
//! - POST /api/bitcoin/address - Issue (or return) the deposit address for a loan
//! - GET /api/bitcoin/address/:customer_id/:loan_id - Look up an issued address
//! - GET /price/btc-aud - Cached BTC/AUD price
//! - GET /health - Health check
//!
//! Callers are expected to be authenticated upstream; handlers only see ids.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::common::LoanVaultError;
use crate::custody::{CustodyError, CustodyService};
use crate::keys::checked_index;
use crate::price::PriceCache;
use crate::storage::{AddressBinding, StorageError};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    pub customer_id: Option<i64>,
    pub loan_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressResponse {
    pub address: String,
    pub customer_id: u32,
    pub loan_id: u32,
    pub path: String,
    pub internal_key: String,
}

impl From<AddressBinding> for AddressResponse {
    fn from(binding: AddressBinding) -> Self {
        Self {
            address: binding.address,
            customer_id: binding.customer_id,
            loan_id: binding.loan_id,
            path: binding.path,
            internal_key: binding.internal_key,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

fn error_body(status: StatusCode, error: &str, details: impl Into<String>) -> Response {
    let response = ErrorResponse {
        error: error.to_string(),
        details: Some(details.into()),
    };
    (status, Json(response)).into_response()
}

/// Map an error onto an HTTP status and `{error, details}` body
fn error_response(err: &LoanVaultError) -> Response {
    let status = match err {
        LoanVaultError::Custody(CustodyError::InvalidIndex { .. }) => StatusCode::BAD_REQUEST,
        LoanVaultError::Custody(CustodyError::Configuration) => StatusCode::SERVICE_UNAVAILABLE,
        LoanVaultError::Storage(StorageError::Conflict(_)) => StatusCode::CONFLICT,
        LoanVaultError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        warn!(target: "loanvault::api", code = err.error_code(), error = %err, "request failed");
    }

    error_body(status, err.error_code(), err.to_string())
}

// =============================================================================
// Application State
// =============================================================================

pub struct AppState {
    /// `None` when no key material is configured
    pub custody: Option<CustodyService>,
    pub prices: Arc<PriceCache>,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    fn custody(&self) -> Result<&CustodyService, LoanVaultError> {
        self.custody
            .as_ref()
            .ok_or(LoanVaultError::Custody(CustodyError::Configuration))
    }
}

fn parse_ids(customer_id: i64, loan_id: i64) -> Result<(u32, u32), LoanVaultError> {
    Ok((
        checked_index("customerId", customer_id)?,
        checked_index("loanId", loan_id)?,
    ))
}

// =============================================================================
// API Handlers
// =============================================================================

/// POST /api/bitcoin/address
///
/// Idempotent: the first call derives and stores the address, later calls
/// return the stored one.
async fn handle_issue_address(
    State(state): State<SharedAppState>,
    body: Result<Json<AddressRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return error_body(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
        }
    };

    let (customer_id, loan_id) = match (req.customer_id, req.loan_id) {
        (Some(c), Some(l)) => (c, l),
        _ => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                "customerId and loanId are required",
            )
        }
    };

    let result = async {
        let (customer_id, loan_id) = parse_ids(customer_id, loan_id)?;
        state.custody()?.issue_address(customer_id, loan_id).await
    }
    .await;

    match result {
        Ok(binding) => {
            info!(
                target: "loanvault::api",
                customer_id = binding.customer_id,
                loan_id = binding.loan_id,
                address = %binding.address,
                "issued deposit address"
            );
            (StatusCode::OK, Json(AddressResponse::from(binding))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/bitcoin/address/:customer_id/:loan_id
async fn handle_get_address(
    State(state): State<SharedAppState>,
    Path((customer_id, loan_id)): Path<(i64, i64)>,
) -> Response {
    let result = async {
        let (customer_id, loan_id) = parse_ids(customer_id, loan_id)?;
        state.custody()?.lookup(customer_id, loan_id).await
    }
    .await;

    match result {
        Ok(Some(binding)) => (StatusCode::OK, Json(AddressResponse::from(binding))).into_response(),
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!(
                "no address issued for customer {} loan {}",
                customer_id, loan_id
            ),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /price/btc-aud
async fn handle_btc_aud(State(state): State<SharedAppState>) -> Response {
    match state.prices.get().await {
        Ok(quote) => (StatusCode::OK, Json(quote)).into_response(),
        Err(e) => error_response(&LoanVaultError::from(e)),
    }
}

/// GET /health
async fn handle_health(State(state): State<SharedAppState>) -> impl IntoResponse {
    let custody = state.custody.as_ref();
    Json(serde_json::json!({
        "status": "ok",
        "service": "loanvault",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": custody.map(|c| c.mode()),
        "advisories": custody.map(|c| c.generator().advisories().to_vec()).unwrap_or_default(),
    }))
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/bitcoin/address", post(handle_issue_address))
        .route(
            "/api/bitcoin/address/:customer_id/:loan_id",
            get(handle_get_address),
        )
        .route("/price/btc-aud", get(handle_btc_aud))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== LoanVault API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /api/bitcoin/address                  - Issue deposit address");
    println!("  GET  /api/bitcoin/address/:customer/:loan  - Look up deposit address");
    println!("  GET  /price/btc-aud                        - BTC/AUD price");
    println!("  GET  /health                               - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================
