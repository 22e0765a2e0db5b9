//! Account management HTTP handlers.
//!
//! This module implements the account-related API endpoints:
//! - POST /api/v1/accounts - Create new account
//! - GET /api/v1/accounts/{id} - Get account by ID
//! - GET /api/v1/accounts - List all accounts for the authenticated owner
//! - GET /api/v1/accounts/{id}/transactions - Account history, newest first

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        account::{AccountResponse, CreateAccountRequest},
        transaction::TransactionResponse,
    },
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Create a new account.
///
/// # Endpoint
///
/// `POST /api/v1/accounts`
///
/// # Request Body
///
/// ```json
/// {
///   "account_name": "Checking"
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Returns the created account with a zero balance
/// - **Error (400)**: Name shorter than 3 or longer than 50 characters
/// - **Error (401)**: Invalid API key
pub async fn create_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .accounts
        .create_account(auth.owner_id, &request.account_name)
        .await?;

    Ok(Json(account.into()))
}

/// Get a specific account by ID.
///
/// Returns 404 if the account doesn't exist OR belongs to a different owner
/// (prevents leaking existence of other accounts).
pub async fn get_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .accounts
        .get_owned_account(auth.owner_id, account_id)
        .await?;

    Ok(Json(account.into()))
}

/// List all accounts for the authenticated owner, oldest first.
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<AccountResponse>>, AppError> {
    let accounts = state.accounts.get_accounts_by_owner(auth.owner_id).await?;

    Ok(Json(accounts.into_iter().map(Into::into).collect()))
}

/// Ledger entries recorded against one account, newest first.
///
/// A transfer appears in both histories: as a `debit` entry for the sender and as a
/// `credit` entry for the receiver, each naming the other as `counterparty_account_id`.
pub async fn list_account_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    // Ownership check before exposing history
    state
        .accounts
        .get_owned_account(auth.owner_id, account_id)
        .await?;

    let transactions = state.transactions.list_by_account(account_id).await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}
