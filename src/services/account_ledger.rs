//! Account ledger - account creation, balance lookup, deposits and transfers.
//!
//! # Atomicity Guarantees
//!
//! Every balance change is a conditioned store write submitted in the same atomic batch
//! as its audit record. The balance check and the balance mutation are one store step,
//! so concurrent requests can never overdraw an account. No in-process lock is taken.
//!
//! # Idempotency
//!
//! A caller-supplied idempotency key becomes the transaction id. Retrying with the same
//! key returns the committed record instead of moving money twice.

use chrono::Utc;
use futures_util::{StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        account::Account,
        transaction::{Transaction, TransactionIntent},
    },
    services::{commit, precheck, transaction_log::TransactionLog},
    store::{BatchOutcomes, Index, Record, SharedStore, SortOrder, StoreError, Table},
};

// Operation positions inside the transfer batch.
const SENDER_OP: usize = 0;
const TRANSFER_RECORD_OP: usize = 2;
const RECEIVER_RECORD_OP: usize = 3;

// Operation positions inside the deposit batch.
const DEPOSIT_RECORD_OP: usize = 1;

#[derive(Clone)]
pub struct AccountLedger {
    store: SharedStore,
    log: TransactionLog,
}

impl AccountLedger {
    pub fn new(store: SharedStore, log: TransactionLog) -> Self {
        Self { store, log }
    }

    /// Create an account with a zero balance.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: name shorter than 3 or longer than 50 characters
    /// - `Conflict`: generated id already taken
    pub async fn create_account(
        &self,
        owner_id: Uuid,
        account_name: &str,
    ) -> Result<Account, AppError> {
        precheck::validate_account_name(account_name)?;

        let account = Account {
            id: Uuid::new_v4(),
            owner_id,
            account_name: account_name.trim().to_string(),
            balance: 0,
            created_at: Utc::now(),
        };

        match self.store.put_if_absent(Record::Account(account.clone())).await {
            Ok(()) => {
                tracing::info!(account_id = %account.id, %owner_id, "account created");
                Ok(account)
            }
            Err(StoreError::AlreadyExists) => Err(AppError::Conflict(format!(
                "account {} already exists",
                account.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, AppError> {
        self.store
            .get(Table::Accounts, account_id)
            .await?
            .ok_or(AppError::AccountNotFound)?
            .into_account()
            .map_err(Into::into)
    }

    /// Like [`get_account`](Self::get_account), but accounts of other owners are reported
    /// as missing.
    pub async fn get_owned_account(
        &self,
        owner_id: Uuid,
        account_id: Uuid,
    ) -> Result<Account, AppError> {
        precheck::ensure_owned(self.get_account(account_id).await?, owner_id)
    }

    /// All accounts of an owner, oldest first.
    pub async fn get_accounts_by_owner(&self, owner_id: Uuid) -> Result<Vec<Account>, AppError> {
        let accounts: Vec<Account> = self
            .store
            .query_by_index(Index::AccountsByOwner, owner_id, SortOrder::OldestFirst)
            .map(|record| record.and_then(Record::into_account))
            .try_collect()
            .await?;
        Ok(accounts)
    }

    /// Add `amount` to an account owned by the caller.
    ///
    /// # Process
    ///
    /// 1. Return the committed record if the caller already used the idempotency key
    ///    for the same deposit
    /// 2. Read the account (ownership check)
    /// 3. Submit credit + audit record as one atomic batch
    pub async fn deposit(
        &self,
        owner_id: Uuid,
        account_id: Uuid,
        amount: i64,
        idempotency_key: Option<Uuid>,
    ) -> Result<Transaction, AppError> {
        precheck::validate_amount(amount)?;

        let intent = TransactionIntent::deposit(owner_id, account_id, amount);
        if let Some(existing) = self.log.find_replay(idempotency_key, &intent).await? {
            return Ok(existing);
        }

        let account = self.get_owned_account(owner_id, account_id).await?;
        precheck::check_credit_fits(&account, amount)?;

        let transaction = Transaction::deposit(
            idempotency_key.unwrap_or_else(Uuid::new_v4),
            &account,
            amount,
            Utc::now(),
        );

        let batch = vec![
            commit::credit_account(account_id, amount),
            commit::record(transaction.clone()),
        ];

        match self.store.atomic_batch(batch).await {
            Ok(()) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    %account_id,
                    amount,
                    "deposit committed"
                );
                Ok(transaction)
            }
            Err(StoreError::BatchAborted(outcomes)) => {
                tracing::warn!(transaction_id = %transaction.id, ?outcomes, "deposit aborted");
                if outcomes.failed_condition(DEPOSIT_RECORD_OP) {
                    return self.log.committed_replay(transaction.id, &intent).await;
                }
                if outcomes.has_transport_error() {
                    return Err(AppError::ServiceUnavailable(
                        "deposit could not be applied".to_string(),
                    ));
                }
                Err(AppError::AccountNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move `amount` from an account owned by the caller to any other account.
    ///
    /// # Process
    ///
    /// 1. Validate amount and distinct accounts
    /// 2. Return the committed record if the caller already used the idempotency key
    ///    for the same transfer
    /// 3. Read the sender (ownership check, advisory balance check) and the receiver
    /// 4. Submit debit + credit + one audit record per side as one atomic batch
    ///
    /// The sender's entry is returned. The receiver's entry is listed under the receiver's
    /// account and owner.
    ///
    /// # Errors
    ///
    /// - `InsufficientBalance`: the sender's conditioned debit failed
    /// - `AccountNotFound`: sender not owned by the caller, or receiver missing
    /// - `Conflict`: the idempotency key was used for a different request
    pub async fn transfer(
        &self,
        owner_id: Uuid,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: i64,
        idempotency_key: Option<Uuid>,
    ) -> Result<Transaction, AppError> {
        precheck::validate_amount(amount)?;
        precheck::validate_transfer_parties(from_account_id, to_account_id)?;

        let intent = TransactionIntent::transfer(owner_id, from_account_id, to_account_id, amount);
        if let Some(existing) = self.log.find_replay(idempotency_key, &intent).await? {
            return Ok(existing);
        }

        let sender = self.get_owned_account(owner_id, from_account_id).await?;
        if let Err(e) = precheck::check_balance(&sender, amount) {
            tracing::debug!(%from_account_id, amount, balance = sender.balance, "transfer rejected early");
            return Err(e);
        }
        // Ownership is immutable, so the snapshot names the receiver's owner for good.
        let receiver = self.get_account(to_account_id).await?;

        let transaction = Transaction::transfer(
            idempotency_key.unwrap_or_else(Uuid::new_v4),
            &sender,
            to_account_id,
            amount,
            Utc::now(),
        );
        let credit_entry = Transaction::transfer_credit(Uuid::new_v4(), &transaction, &receiver);

        let batch = vec![
            commit::debit_account(from_account_id, amount),
            commit::credit_account(to_account_id, amount),
            commit::record(transaction.clone()),
            commit::record(credit_entry),
        ];

        match self.store.atomic_batch(batch).await {
            Ok(()) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    %from_account_id,
                    %to_account_id,
                    amount,
                    "transfer committed"
                );
                Ok(transaction)
            }
            Err(StoreError::BatchAborted(outcomes)) => {
                tracing::warn!(transaction_id = %transaction.id, ?outcomes, "transfer aborted");
                if outcomes.failed_condition(TRANSFER_RECORD_OP) {
                    return self.log.committed_replay(transaction.id, &intent).await;
                }
                if outcomes.failed_condition(RECEIVER_RECORD_OP) {
                    return Err(AppError::Conflict(
                        "receiver entry id already taken".to_string(),
                    ));
                }
                // The sender was read above and accounts are never deleted.
                if outcomes.failed_condition(SENDER_OP) {
                    return Err(AppError::InsufficientBalance);
                }
                if outcomes.has_transport_error() {
                    return Err(AppError::ServiceUnavailable(
                        "transfer could not be applied".to_string(),
                    ));
                }
                Err(AppError::AccountNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}
