//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: Store record representing a ledger account
//! - `CreateAccountRequest`: Request body for creating accounts
//! - `AccountResponse`: Response body returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an account record from the store.
///
/// # Store Table
///
/// Maps to the `accounts` table, indexed by `owner_id`. Each account:
/// - Belongs to exactly one owner (immutable after creation)
/// - Has a balance stored in minor currency units (cents)
///
/// # Balance Storage
///
/// Balances are stored as `i64` cents to avoid floating-point precision issues.
///
/// For example:
/// - $10.50 is stored as 1050 cents
/// - $100.00 is stored as 10000 cents
///
/// The balance is never assigned directly. Only deposits, transfers and purchases
/// move it, and always through a conditioned store write.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account
    pub id: Uuid,

    /// Owner of this account (the authenticated caller that created it)
    pub owner_id: Uuid,

    /// Human-readable name for this account
    pub account_name: String,

    /// Current balance in cents
    ///
    /// Must be >= 0 (enforced by the store on every write).
    pub balance: i64,

    /// Timestamp when account was created
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a new account.
///
/// # JSON Example
///
/// ```json
/// {
///   "account_name": "Checking"
/// }
/// ```
///
/// # Validation
///
/// - `account_name`: between 3 and 50 characters
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Name for the new account
    pub account_name: String,
}

/// Response body for account endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "account_name": "Checking",
///   "balance": 100000,
///   "created_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub account_name: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Convert store Account to API AccountResponse.
///
/// This transformation removes the internal `owner_id` field.
impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            account_name: account.account_name,
            balance: account.balance,
            created_at: account.created_at,
        }
    }
}
