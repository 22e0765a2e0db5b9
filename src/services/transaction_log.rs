//! Append-only audit trail of ledger-affecting operations.

use futures_util::{StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::transaction::{Transaction, TransactionIntent},
    store::{Index, Record, SharedStore, SortOrder, StoreError, Table},
};

#[derive(Clone)]
pub struct TransactionLog {
    store: SharedStore,
}

impl TransactionLog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Insert a ledger entry on its own.
    ///
    /// Re-appending the same entry succeeds without writing anything. A different entry
    /// under an existing id is a `Conflict`.
    pub async fn append(&self, transaction: Transaction) -> Result<Transaction, AppError> {
        match self
            .store
            .put_if_absent(Record::Transaction(transaction.clone()))
            .await
        {
            Ok(()) => Ok(transaction),
            Err(StoreError::AlreadyExists) => {
                let existing = self.get(transaction.id).await?;
                if existing.is_replay_of(&transaction) {
                    tracing::debug!(transaction_id = %transaction.id, "duplicate append ignored");
                    Ok(existing)
                } else {
                    Err(conflict(transaction.id))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .get(Table::Transactions, id)
            .await?
            .ok_or(AppError::TransactionNotFound)?
            .into_transaction()
            .map_err(Into::into)
    }

    /// Transactions of other owners are reported as missing.
    pub async fn get_owned(&self, owner_id: Uuid, id: Uuid) -> Result<Transaction, AppError> {
        let transaction = self.get(id).await?;
        if transaction.owner_id != owner_id {
            return Err(AppError::TransactionNotFound);
        }
        Ok(transaction)
    }

    /// The earlier commit named by an idempotency key, if there is one.
    ///
    /// An entry of another owner is reported as `AccountNotFound`, the same as touching
    /// their account. An entry of the caller that records a different request is
    /// `Conflict`.
    pub async fn find_replay(
        &self,
        key: Option<Uuid>,
        intent: &TransactionIntent,
    ) -> Result<Option<Transaction>, AppError> {
        let Some(key) = key else {
            return Ok(None);
        };

        match self.store.get(Table::Transactions, key).await? {
            None => Ok(None),
            Some(record) => {
                let existing = record.into_transaction()?;
                if existing.owner_id != intent.owner_id {
                    tracing::debug!(transaction_id = %key, "idempotency key names a foreign entry");
                    return Err(AppError::AccountNotFound);
                }
                if !intent.matches(&existing) {
                    return Err(conflict(key));
                }
                tracing::info!(
                    transaction_id = %key,
                    kind = %intent.kind,
                    "replaying committed transaction"
                );
                Ok(Some(existing))
            }
        }
    }

    /// Resolve a batch whose audit insert failed: an earlier attempt already committed.
    pub(crate) async fn committed_replay(
        &self,
        key: Uuid,
        intent: &TransactionIntent,
    ) -> Result<Transaction, AppError> {
        self.find_replay(Some(key), intent).await?.ok_or_else(|| {
            AppError::Internal(format!("transaction {key} rejected as duplicate but not found"))
        })
    }

    /// Newest first.
    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        self.list(Index::TransactionsByOwner, owner_id).await
    }

    /// Newest first.
    pub async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        self.list(Index::TransactionsByAccount, account_id).await
    }

    async fn list(&self, index: Index, key: Uuid) -> Result<Vec<Transaction>, AppError> {
        let transactions: Vec<Transaction> = self
            .store
            .query_by_index(index, key, SortOrder::NewestFirst)
            .map(|record| record.and_then(Record::into_transaction))
            .try_collect()
            .await?;
        Ok(transactions)
    }
}

fn conflict(id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "transaction {id} already exists with different details"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::account::Account;
    use crate::models::transaction::{EntrySide, TransactionKind};
    use crate::store::InMemoryLedgerStore;

    fn log() -> TransactionLog {
        TransactionLog::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            account_name: "Checking".to_string(),
            balance: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reappending_the_same_entry_is_a_no_op() {
        let log = log();
        let acct = account();
        let entry = Transaction::deposit(Uuid::new_v4(), &acct, 500, Utc::now());

        log.append(entry.clone()).await.unwrap();
        let mut retry = entry.clone();
        retry.created_at += Duration::seconds(3);
        let stored = log.append(retry).await.unwrap();

        assert_eq!(stored, entry);
        assert_eq!(log.list_by_account(acct.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_entry_under_same_id_conflicts() {
        let log = log();
        let acct = account();
        let id = Uuid::new_v4();

        log.append(Transaction::deposit(id, &acct, 500, Utc::now()))
            .await
            .unwrap();
        let result = log
            .append(Transaction::deposit(id, &acct, 700, Utc::now()))
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let log = log();
        let acct = account();
        let start = Utc::now();
        for (offset, amount) in [(0, 100), (1, 200), (2, 300)] {
            log.append(Transaction::deposit(
                Uuid::new_v4(),
                &acct,
                amount,
                start + Duration::seconds(offset),
            ))
            .await
            .unwrap();
        }

        let amounts: Vec<i64> = log
            .list_by_owner(acct.owner_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.total_amount)
            .collect();

        assert_eq!(amounts, vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn replay_lookup_checks_account_and_kind() {
        let log = log();
        let acct = account();
        let key = Uuid::new_v4();
        log.append(Transaction::deposit(key, &acct, 500, Utc::now()))
            .await
            .unwrap();
        let deposit = TransactionIntent::deposit(acct.owner_id, acct.id, 500);

        assert!(log.find_replay(None, &deposit).await.unwrap().is_none());
        assert!(log.find_replay(Some(key), &deposit).await.unwrap().is_some());
        assert!(matches!(
            log.find_replay(
                Some(key),
                &TransactionIntent::purchase(acct.owner_id, acct.id, Uuid::new_v4(), 1)
            )
            .await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            log.find_replay(
                Some(key),
                &TransactionIntent::deposit(acct.owner_id, Uuid::new_v4(), 500)
            )
            .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn replay_lookup_compares_request_details() {
        let log = log();
        let acct = account();
        let receiver = Uuid::new_v4();
        let product = Uuid::new_v4();
        let deposit_key = Uuid::new_v4();
        let transfer_key = Uuid::new_v4();
        let purchase_key = Uuid::new_v4();
        let now = Utc::now();
        log.append(Transaction::deposit(deposit_key, &acct, 500, now))
            .await
            .unwrap();
        log.append(Transaction::transfer(transfer_key, &acct, receiver, 300, now))
            .await
            .unwrap();
        let mut purchase = Transaction::deposit(purchase_key, &acct, 900, now);
        purchase.kind = TransactionKind::Purchase;
        purchase.side = EntrySide::Debit;
        purchase.product_id = Some(product);
        purchase.quantity = 3;
        purchase.unit_price = 300;
        log.append(purchase).await.unwrap();

        let owner = acct.owner_id;
        let mismatches = [
            (deposit_key, TransactionIntent::deposit(owner, acct.id, 501)),
            (transfer_key, TransactionIntent::transfer(owner, acct.id, receiver, 301)),
            (transfer_key, TransactionIntent::transfer(owner, acct.id, Uuid::new_v4(), 300)),
            (purchase_key, TransactionIntent::purchase(owner, acct.id, product, 2)),
            (purchase_key, TransactionIntent::purchase(owner, acct.id, Uuid::new_v4(), 3)),
        ];
        for (key, intent) in mismatches {
            assert!(
                matches!(log.find_replay(Some(key), &intent).await, Err(AppError::Conflict(_))),
                "{intent:?} should conflict"
            );
        }

        assert!(
            log.find_replay(
                Some(purchase_key),
                &TransactionIntent::purchase(owner, acct.id, product, 3)
            )
            .await
            .unwrap()
            .is_some()
        );
    }

    #[tokio::test]
    async fn replay_lookup_hides_foreign_entries() {
        let log = log();
        let acct = account();
        let key = Uuid::new_v4();
        log.append(Transaction::deposit(key, &acct, 500, Utc::now()))
            .await
            .unwrap();

        let result = log
            .find_replay(
                Some(key),
                &TransactionIntent::deposit(Uuid::new_v4(), acct.id, 500),
            )
            .await;

        assert!(matches!(result, Err(AppError::AccountNotFound)));
    }

    #[tokio::test]
    async fn foreign_transactions_look_missing() {
        let log = log();
        let acct = account();
        let entry = log
            .append(Transaction::deposit(Uuid::new_v4(), &acct, 500, Utc::now()))
            .await
            .unwrap();

        assert!(log.get_owned(acct.owner_id, entry.id).await.is_ok());
        assert!(matches!(
            log.get_owned(Uuid::new_v4(), entry.id).await,
            Err(AppError::TransactionNotFound)
        ));
    }
}
