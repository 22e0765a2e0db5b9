//! Transaction HTTP handlers.
//!
//! This module implements transaction-related API endpoints:
//! - POST /api/v1/transactions/deposit - Add money to an account
//! - POST /api/v1/transactions/transfer - Move money between accounts
//! - GET /api/v1/transactions - Caller's history, newest first
//! - GET /api/v1/transactions/{id} - Get transaction details

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::transaction::{DepositRequest, TransactionResponse, TransferRequest},
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Deposit into an account (add money).
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "amount": 100000,
///   "idempotency_key": "9b2f6a2e-..."
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "id": "9b2f6a2e-...",
///   "kind": "deposit",
///   "account_id": "550e8400-...",
///   "total_amount": 100000,
///   "created_at": "2025-12-21T16:00:00Z"
/// }
/// ```
pub async fn create_deposit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .accounts
        .deposit(
            auth.owner_id,
            request.account_id,
            request.amount,
            request.idempotency_key,
        )
        .await?;

    Ok(Json(transaction.into()))
}

/// Transfer money between accounts.
///
/// # Atomicity
///
/// Debit, credit and the audit record are one atomic store batch.
/// Either all succeed or none do.
///
/// # Validation
///
/// - Source account must belong to the authenticated owner
/// - Source must have sufficient balance
/// - Accounts must be different
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .accounts
        .transfer(
            auth.owner_id,
            request.from_account_id,
            request.to_account_id,
            request.amount,
            request.idempotency_key,
        )
        .await?;

    Ok(Json(transaction.into()))
}

/// Every ledger entry of the authenticated owner, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let transactions = state.transactions.list_by_owner(auth.owner_id).await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// Get transaction by ID.
///
/// Returns 404 if the transaction belongs to a different owner.
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .transactions
        .get_owned(auth.owner_id, transaction_id)
        .await?;

    Ok(Json(transaction.into()))
}
