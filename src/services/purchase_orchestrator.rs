//! Purchase orchestration - one atomic debit + stock decrement + audit record.
//!
//! # Process
//!
//! 1. Validate quantity and replay the caller's already-committed idempotency key
//! 2. Point-read the account (ownership check) and product as a diagnostic snapshot
//! 3. Reject early if the snapshot shows too little stock or balance
//! 4. Submit one atomic batch:
//!    - debit the account, conditioned on `balance >= total`
//!    - decrement stock, conditioned on `stock >= quantity`
//!    - insert the purchase record, conditioned on its id being new
//! 5. On abort, derive the most specific error from the snapshot and the
//!    per-operation outcomes
//!
//! The snapshot is never authoritative. Two buyers racing for the last units both pass
//! step 3; the store lets exactly one batch through.

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        account::Account,
        product::Product,
        transaction::{Transaction, TransactionIntent},
    },
    services::{
        account_ledger::AccountLedger, commit, inventory_catalog::InventoryCatalog, precheck,
        transaction_log::TransactionLog,
    },
    store::{BatchOutcomes, OpResult, SharedStore, StoreError},
};

// Operation positions inside the purchase batch.
const BALANCE_OP: usize = 0;
const STOCK_OP: usize = 1;
const RECORD_OP: usize = 2;

#[derive(Clone)]
pub struct PurchaseOrchestrator {
    store: SharedStore,
    accounts: AccountLedger,
    catalog: InventoryCatalog,
    log: TransactionLog,
}

/// What an aborted purchase batch means.
#[derive(Debug)]
enum AbortCause {
    /// An earlier attempt with the same transaction id committed.
    AlreadyCommitted,
    Failed(AppError),
}

impl PurchaseOrchestrator {
    pub fn new(
        store: SharedStore,
        accounts: AccountLedger,
        catalog: InventoryCatalog,
        log: TransactionLog,
    ) -> Self {
        Self {
            store,
            accounts,
            catalog,
            log,
        }
    }

    /// Buy `quantity` units of a product with money from an account owned by the caller.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: non-positive quantity, or total cost overflows
    /// - `AccountNotFound` / `ProductNotFound`: missing (or foreign) account, missing product
    /// - `OutOfStock`: fewer than `quantity` units available
    /// - `InsufficientBalance`: balance below `price * quantity`
    /// - `Conflict`: idempotency key already used for a different purchase
    /// - `ServiceUnavailable`: store unreachable; retry with the same idempotency key
    pub async fn purchase(
        &self,
        owner_id: Uuid,
        account_id: Uuid,
        product_id: Uuid,
        quantity: i64,
        idempotency_key: Option<Uuid>,
    ) -> Result<Transaction, AppError> {
        precheck::validate_quantity(quantity)?;

        let intent = TransactionIntent::purchase(owner_id, account_id, product_id, quantity);
        if let Some(existing) = self.log.find_replay(idempotency_key, &intent).await? {
            return Ok(existing);
        }

        let account = self.accounts.get_owned_account(owner_id, account_id).await?;
        let product = self.catalog.get_product(product_id).await?;
        let total_cost = precheck::purchase_cost(product.price, quantity)?;

        if let Err(e) = precheck::check_purchase(&account, &product, quantity, total_cost) {
            tracing::debug!(
                %account_id,
                %product_id,
                quantity,
                stock = product.stock,
                balance = account.balance,
                "purchase rejected early"
            );
            return Err(e);
        }

        let transaction = Transaction::purchase(
            idempotency_key.unwrap_or_else(Uuid::new_v4),
            &account,
            &product,
            quantity,
            total_cost,
            Utc::now(),
        );

        let batch = vec![
            commit::debit_account(account_id, total_cost),
            commit::take_stock(product_id, quantity),
            commit::record(transaction.clone()),
        ];

        match self.store.atomic_batch(batch).await {
            Ok(()) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    %account_id,
                    %product_id,
                    quantity,
                    total_cost,
                    "purchase committed"
                );
                Ok(transaction)
            }
            Err(StoreError::BatchAborted(outcomes)) => {
                tracing::warn!(transaction_id = %transaction.id, ?outcomes, "purchase aborted");
                match diagnose_abort(&outcomes, &account, &product, quantity, total_cost) {
                    AbortCause::AlreadyCommitted => {
                        self.log.committed_replay(transaction.id, &intent).await
                    }
                    AbortCause::Failed(e) => Err(e),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Best-effort diagnosis against the pre-batch snapshot; nothing is re-read.
///
/// A product deleted between snapshot and commit fails the stock operation and is
/// reported as `OutOfStock`.
fn diagnose_abort(
    outcomes: &[OpResult],
    account: &Account,
    product: &Product,
    quantity: i64,
    total_cost: i64,
) -> AbortCause {
    if outcomes.failed_condition(RECORD_OP) {
        return AbortCause::AlreadyCommitted;
    }

    let error = if account.balance < total_cost {
        AppError::InsufficientBalance
    } else if product.stock < quantity {
        AppError::OutOfStock
    } else if outcomes.failed_condition(STOCK_OP) {
        AppError::OutOfStock
    } else if outcomes.failed_condition(BALANCE_OP) {
        AppError::InsufficientBalance
    } else if outcomes.has_transport_error() {
        AppError::ServiceUnavailable("purchase could not be applied".to_string())
    } else {
        AppError::AccountNotFound
    };
    AbortCause::Failed(error)
}
