//! Transaction (ledger entry) models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: Append-only audit record of one ledger-affecting operation
//! - `TransactionKind`: deposit, transfer or purchase
//! - `EntrySide`: whether the entry debited or credited its account
//! - `TransactionIntent`: what a request asked for, matched against reused idempotency keys
//! - Request types for deposit, transfer and purchase operations
//! - `TransactionResponse`: Response body returned to clients

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{account::Account, product::Product};

/// The operation a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Deposit,
    Purchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction kind: {0}")]
pub struct UnknownTransactionKind(String);

impl TryFrom<String> for TransactionKind {
    type Error = UnknownTransactionKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "transfer" => Ok(TransactionKind::Transfer),
            "deposit" => Ok(TransactionKind::Deposit),
            "purchase" => Ok(TransactionKind::Purchase),
            _ => Err(UnknownTransactionKind(value)),
        }
    }
}

/// Direction of the balance change an entry records on its own account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "debit",
            EntrySide::Credit => "credit",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown entry side: {0}")]
pub struct UnknownEntrySide(String);

impl TryFrom<String> for EntrySide {
    type Error = UnknownEntrySide;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "debit" => Ok(EntrySide::Debit),
            "credit" => Ok(EntrySide::Credit),
            _ => Err(UnknownEntrySide(value)),
        }
    }
}

/// Represents a transaction record from the store.
///
/// # Store Table
///
/// Maps to the `transactions` table, indexed by `owner_id` and by `account_id`.
/// Each transaction:
/// - Is written exactly once, in the same atomic batch as the balance/stock changes it records
/// - Is never updated or deleted
/// - Stores amounts in cents (never floats!)
///
/// # Field usage by kind
///
/// | kind     | side   | account_id | counterparty_account_id | product_id | quantity | unit_price |
/// |----------|--------|------------|-------------------------|------------|----------|------------|
/// | deposit  | credit | credited   | None                    | None       | 1        | amount     |
/// | transfer | debit  | sender     | receiver                | None       | 1        | amount     |
/// | transfer | credit | receiver   | sender                  | None       | 1        | amount     |
/// | purchase | debit  | debited    | None                    | product    | units    | price      |
///
/// A transfer writes both of its rows in one batch. The debit row carries the
/// idempotency key as its id; the credit row belongs to the receiver's owner.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier (random UUID or the caller's idempotency key)
    pub id: Uuid,

    /// Owner of `account_id` at the time of the operation
    pub owner_id: Uuid,

    pub account_id: Uuid,

    pub counterparty_account_id: Option<Uuid>,

    pub product_id: Option<Uuid>,

    pub quantity: i64,

    pub unit_price: i64,

    /// Always `unit_price * quantity`
    pub total_amount: i64,

    #[sqlx(try_from = "String")]
    pub kind: TransactionKind,

    #[sqlx(try_from = "String")]
    pub side: EntrySide,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn deposit(id: Uuid, account: &Account, amount: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: account.owner_id,
            account_id: account.id,
            counterparty_account_id: None,
            product_id: None,
            quantity: 1,
            unit_price: amount,
            total_amount: amount,
            kind: TransactionKind::Deposit,
            side: EntrySide::Credit,
            created_at,
        }
    }

    pub fn transfer(
        id: Uuid,
        sender: &Account,
        receiver_id: Uuid,
        amount: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id: sender.owner_id,
            account_id: sender.id,
            counterparty_account_id: Some(receiver_id),
            product_id: None,
            quantity: 1,
            unit_price: amount,
            total_amount: amount,
            kind: TransactionKind::Transfer,
            side: EntrySide::Debit,
            created_at,
        }
    }

    /// The receiver's half of a transfer, written next to `debit` in the same batch.
    pub fn transfer_credit(id: Uuid, debit: &Transaction, receiver: &Account) -> Self {
        Self {
            id,
            owner_id: receiver.owner_id,
            account_id: receiver.id,
            counterparty_account_id: Some(debit.account_id),
            product_id: None,
            quantity: 1,
            unit_price: debit.unit_price,
            total_amount: debit.total_amount,
            kind: TransactionKind::Transfer,
            side: EntrySide::Credit,
            created_at: debit.created_at,
        }
    }

    pub fn purchase(
        id: Uuid,
        account: &Account,
        product: &Product,
        quantity: i64,
        total_amount: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id: account.owner_id,
            account_id: account.id,
            counterparty_account_id: None,
            product_id: Some(product.id),
            quantity,
            unit_price: product.price,
            total_amount,
            kind: TransactionKind::Purchase,
            side: EntrySide::Debit,
            created_at,
        }
    }

    /// Whether `other` describes the same ledger entry.
    ///
    /// Timestamps are excluded: the store may truncate them (Postgres keeps microseconds).
    pub fn is_replay_of(&self, other: &Transaction) -> bool {
        self.id == other.id
            && self.owner_id == other.owner_id
            && self.account_id == other.account_id
            && self.counterparty_account_id == other.counterparty_account_id
            && self.product_id == other.product_id
            && self.quantity == other.quantity
            && self.unit_price == other.unit_price
            && self.total_amount == other.total_amount
            && self.kind == other.kind
            && self.side == other.side
    }
}

/// The caller-visible parameters of a deposit, transfer or purchase request.
///
/// A retry reusing an idempotency key must ask for the same thing the committed entry
/// records. Purchases compare product and quantity only: the unit price is read from the
/// product when the batch is built and may have changed between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionIntent {
    pub owner_id: Uuid,
    pub kind: TransactionKind,
    pub account_id: Uuid,
    pub counterparty_account_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub quantity: i64,
    pub amount: Option<i64>,
}

impl TransactionIntent {
    pub fn deposit(owner_id: Uuid, account_id: Uuid, amount: i64) -> Self {
        Self {
            owner_id,
            kind: TransactionKind::Deposit,
            account_id,
            counterparty_account_id: None,
            product_id: None,
            quantity: 1,
            amount: Some(amount),
        }
    }

    pub fn transfer(
        owner_id: Uuid,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: i64,
    ) -> Self {
        Self {
            owner_id,
            kind: TransactionKind::Transfer,
            account_id: from_account_id,
            counterparty_account_id: Some(to_account_id),
            product_id: None,
            quantity: 1,
            amount: Some(amount),
        }
    }

    pub fn purchase(owner_id: Uuid, account_id: Uuid, product_id: Uuid, quantity: i64) -> Self {
        Self {
            owner_id,
            kind: TransactionKind::Purchase,
            account_id,
            counterparty_account_id: None,
            product_id: Some(product_id),
            quantity,
            amount: None,
        }
    }

    /// Side of the entry the request itself writes under its idempotency key.
    pub fn side(&self) -> EntrySide {
        match self.kind {
            TransactionKind::Deposit => EntrySide::Credit,
            TransactionKind::Transfer | TransactionKind::Purchase => EntrySide::Debit,
        }
    }

    /// Whether `entry` records this request. Ownership is checked separately.
    pub fn matches(&self, entry: &Transaction) -> bool {
        entry.kind == self.kind
            && entry.side == self.side()
            && entry.account_id == self.account_id
            && entry.counterparty_account_id == self.counterparty_account_id
            && entry.product_id == self.product_id
            && entry.quantity == self.quantity
            && self.amount.is_none_or(|amount| entry.total_amount == amount)
    }
}

/// Request to deposit money into an account.
///
/// # JSON Example
///
/// ```json
/// {
///   "account_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount": 100000,
///   "idempotency_key": "9b2f6a2e-8f7c-4d8e-9a51-0c3b1c2d4e5f"
/// }
/// ```
///
/// `idempotency_key` becomes the transaction id. Retrying with the same key after a
/// timeout never applies the deposit twice.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub account_id: Uuid,
    pub amount: i64,
    pub idempotency_key: Option<Uuid>,
}

/// Request to transfer money between accounts.
///
/// # JSON Example
///
/// ```json
/// {
///   "from_account_id": "550e8400-e29b-41d4-a716-446655440000",
///   "to_account_id": "660e8400-e29b-41d4-a716-446655440001",
///   "amount": 25000
/// }
/// ```
///
/// # Atomicity Guarantee
///
/// Debit, credit and the audit record are one atomic store batch.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: i64,
    pub idempotency_key: Option<Uuid>,
}

/// Request to buy `quantity` units of a product, paid from `account_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub idempotency_key: Option<Uuid>,
}

/// Response returned for transaction operations.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "kind": "purchase",
///   "side": "debit",
///   "account_id": "550e8400-e29b-41d4-a716-446655440000",
///   "counterparty_account_id": null,
///   "product_id": "880e8400-e29b-41d4-a716-446655440003",
///   "quantity": 2,
///   "unit_price": 4900,
///   "total_amount": 9800,
///   "created_at": "2025-12-21T16:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub side: EntrySide,
    pub account_id: Uuid,
    pub counterparty_account_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Convert store Transaction to API TransactionResponse.
///
/// This removes the internal `owner_id` field.
impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            kind: transaction.kind,
            side: transaction.side,
            account_id: transaction.account_id,
            counterparty_account_id: transaction.counterparty_account_id,
            product_id: transaction.product_id,
            quantity: transaction.quantity,
            unit_price: transaction.unit_price,
            total_amount: transaction.total_amount,
            created_at: transaction.created_at,
        }
    }
}
