//! Ledger store boundary.
//!
//! This module defines a storage-agnostic contract over a keyed record store: point get,
//! insert-if-absent, conditional update/delete, index queries and a bounded atomic
//! multi-record write. Every consistency guarantee of the ledger rests on two properties
//! of an implementation:
//!
//! - A conditioned write evaluates its predicates and applies its mutation as one step.
//! - `atomic_batch` applies every operation or none of them.
//!
//! Callers never read-then-write to enforce an invariant; they express the invariant as a
//! `Predicate` on the write itself.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{account::Account, product::Product, transaction::Transaction};

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Maximum number of operations accepted by [`LedgerStore::atomic_batch`].
pub const MAX_BATCH_OPS: usize = 25;

/// Shared handle passed to every component at composition time.
pub type SharedStore = Arc<dyn LedgerStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Accounts,
    Products,
    Transactions,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Products => "products",
            Table::Transactions => "transactions",
        }
    }
}

/// Secondary indexes. Products have none beyond the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    AccountsByOwner,
    TransactionsByOwner,
    TransactionsByAccount,
}

impl Index {
    pub fn table(&self) -> Table {
        match self {
            Index::AccountsByOwner => Table::Accounts,
            Index::TransactionsByOwner | Index::TransactionsByAccount => Table::Transactions,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Index::AccountsByOwner => "accounts_owner_id_idx",
            Index::TransactionsByOwner => "transactions_owner_id_idx",
            Index::TransactionsByAccount => "transactions_account_id_idx",
        }
    }
}

/// Ordering of index query results by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    OldestFirst,
    NewestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Account(Account),
    Product(Product),
    Transaction(Transaction),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Account(_) => Table::Accounts,
            Record::Product(_) => Table::Products,
            Record::Transaction(_) => Table::Transactions,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::Account(a) => a.id,
            Record::Product(p) => p.id,
            Record::Transaction(t) => t.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Record::Account(a) => a.created_at,
            Record::Product(p) => p.created_at,
            Record::Transaction(t) => t.created_at,
        }
    }

    pub fn into_account(self) -> Result<Account, StoreError> {
        match self {
            Record::Account(a) => Ok(a),
            other => Err(StoreError::UnexpectedRecord(other.table().name())),
        }
    }

    pub fn into_product(self) -> Result<Product, StoreError> {
        match self {
            Record::Product(p) => Ok(p),
            other => Err(StoreError::UnexpectedRecord(other.table().name())),
        }
    }

    pub fn into_transaction(self) -> Result<Transaction, StoreError> {
        match self {
            Record::Transaction(t) => Ok(t),
            other => Err(StoreError::UnexpectedRecord(other.table().name())),
        }
    }
}

/// A change applied by a conditioned update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `balance = balance + delta` (accounts only)
    AddToBalance(i64),

    /// `stock = stock + delta` (products only)
    AddToStock(i64),

    /// Full replacement of a product's mutable fields
    ReplaceProduct {
        name: String,
        description: String,
        price: i64,
        stock: i64,
    },
}

impl Mutation {
    fn applies_to(&self, table: Table) -> bool {
        matches!(
            (self, table),
            (Mutation::AddToBalance(_), Table::Accounts)
                | (Mutation::AddToStock(_), Table::Products)
                | (Mutation::ReplaceProduct { .. }, Table::Products)
        )
    }
}

/// A condition over a record's state at commit time.
///
/// Multiple predicates on one operation are combined with AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Exists,
    BalanceAtLeast(i64),
    StockAtLeast(i64),
}

impl Predicate {
    fn applies_to(&self, table: Table) -> bool {
        matches!(
            (self, table),
            (Predicate::Exists, _)
                | (Predicate::BalanceAtLeast(_), Table::Accounts)
                | (Predicate::StockAtLeast(_), Table::Products)
        )
    }
}

/// One entry of an atomic batch.
///
/// Inserts are always conditioned on the id not existing yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Update {
        table: Table,
        key: Uuid,
        mutation: Mutation,
        conditions: Vec<Predicate>,
    },
    Insert {
        record: Record,
    },
}

impl WriteOp {
    pub fn update(table: Table, key: Uuid, mutation: Mutation) -> Self {
        WriteOp::Update {
            table,
            key,
            mutation,
            conditions: Vec::new(),
        }
    }

    pub fn insert(record: Record) -> Self {
        WriteOp::Insert { record }
    }

    /// Add a predicate to an update. Has no effect on inserts.
    pub fn require(mut self, predicate: Predicate) -> Self {
        if let WriteOp::Update { conditions, .. } = &mut self {
            conditions.push(predicate);
        }
        self
    }

    pub fn target(&self) -> (Table, Uuid) {
        match self {
            WriteOp::Update { table, key, .. } => (*table, *key),
            WriteOp::Insert { record } => (record.table(), record.id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Ok,
    ConditionFailed,
    TransportError,
}

/// Outcome of a single operation inside an aborted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpResult {
    pub index: usize,
    pub outcome: OpOutcome,
}

/// Helpers for reading the per-operation outcomes of an aborted batch.
pub trait BatchOutcomes {
    fn failed_condition(&self, index: usize) -> bool;
    fn has_transport_error(&self) -> bool;
}

impl BatchOutcomes for [OpResult] {
    fn failed_condition(&self, index: usize) -> bool {
        self.iter()
            .any(|r| r.index == index && r.outcome == OpOutcome::ConditionFailed)
    }

    fn has_transport_error(&self) -> bool {
        self.iter().any(|r| r.outcome == OpOutcome::TransportError)
    }
}

/// Ledger store operation error.
///
/// `AlreadyExists`, `ConditionFailed` and `BatchAborted` are expected
/// outcomes that callers translate into domain errors. `Unavailable` and `Timeout` mean
/// the store could not be reached or did not answer; after a `Timeout` on a write the
/// outcome is unknown.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("condition check failed")]
    ConditionFailed,

    #[error("atomic batch aborted")]
    BatchAborted(Vec<OpResult>),

    #[error("batch of {0} operations exceeds the limit of {max}", max = MAX_BATCH_OPS)]
    BatchTooLarge(usize),

    #[error("batch targets {0} record {1} more than once")]
    DuplicateTarget(&'static str, Uuid),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unexpected record from table {0}")]
    UnexpectedRecord(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,

    #[error("store error: {0}")]
    Backend(String),
}

/// Append/query/conditional-write contract consumed by every ledger component.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - Evaluate predicates and apply mutations of one operation atomically
/// - Apply an `atomic_batch` entirely or not at all, reporting per-operation outcomes
///   on abort
/// - Reject batches larger than [`MAX_BATCH_OPS`] or targeting a record twice
/// - Never create a record through an update
/// - Keep `balance >= 0` and `stock >= 0`, failing the offending write otherwise
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, table: Table, key: Uuid) -> Result<Option<Record>, StoreError>;

    /// Insert a record unless its id already exists (`AlreadyExists`).
    async fn put_if_absent(&self, record: Record) -> Result<(), StoreError>;

    /// Apply `mutation` if every predicate holds, returning the updated record.
    async fn conditional_update(
        &self,
        table: Table,
        key: Uuid,
        mutation: Mutation,
        conditions: Vec<Predicate>,
    ) -> Result<Record, StoreError>;

    async fn conditional_delete(
        &self,
        table: Table,
        key: Uuid,
        conditions: Vec<Predicate>,
    ) -> Result<(), StoreError>;

    /// Records whose index attribute equals `key`, ordered by creation time.
    fn query_by_index(
        &self,
        index: Index,
        key: Uuid,
        order: SortOrder,
    ) -> BoxStream<'_, Result<Record, StoreError>>;

    fn scan(&self, table: Table) -> BoxStream<'_, Result<Record, StoreError>>;

    /// Commit every operation or none. On abort returns `BatchAborted` with one
    /// `OpResult` per operation.
    async fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Structural checks shared by every implementation, run before any write.
pub(crate) fn validate_batch(ops: &[WriteOp]) -> Result<(), StoreError> {
    if ops.len() > MAX_BATCH_OPS {
        return Err(StoreError::BatchTooLarge(ops.len()));
    }

    let mut targets = HashSet::with_capacity(ops.len());
    for op in ops {
        if let WriteOp::Update {
            table,
            mutation,
            conditions,
            ..
        } = op
        {
            validate_update(*table, Some(mutation), conditions)?;
        }

        let (table, key) = op.target();
        if !targets.insert((table, key)) {
            return Err(StoreError::DuplicateTarget(table.name(), key));
        }
    }

    Ok(())
}

/// Checks that a mutation and its predicates refer to columns of `table`.
pub(crate) fn validate_update(
    table: Table,
    mutation: Option<&Mutation>,
    conditions: &[Predicate],
) -> Result<(), StoreError> {
    if let Some(mutation) = mutation.filter(|m| !m.applies_to(table)) {
        return Err(StoreError::InvalidOperation(format!(
            "{mutation:?} cannot be applied to {}",
            table.name()
        )));
    }
    if let Some(predicate) = conditions.iter().find(|p| !p.applies_to(table)) {
        return Err(StoreError::InvalidOperation(format!(
            "{predicate:?} cannot be evaluated on {}",
            table.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_batches_over_the_limit() {
        let ops: Vec<WriteOp> = (0..=MAX_BATCH_OPS)
            .map(|_| WriteOp::update(Table::Accounts, Uuid::new_v4(), Mutation::AddToBalance(1)))
            .collect();

        assert!(matches!(
            validate_batch(&ops),
            Err(StoreError::BatchTooLarge(n)) if n == MAX_BATCH_OPS + 1
        ));
    }

    #[test]
    fn rejects_two_operations_on_the_same_record() {
        let id = Uuid::new_v4();
        let ops = vec![
            WriteOp::update(Table::Accounts, id, Mutation::AddToBalance(-5)),
            WriteOp::update(Table::Accounts, id, Mutation::AddToBalance(5)),
        ];

        assert!(matches!(
            validate_batch(&ops),
            Err(StoreError::DuplicateTarget("accounts", key)) if key == id
        ));
    }

    #[test]
    fn rejects_mutations_on_the_wrong_table() {
        let ops = vec![WriteOp::update(
            Table::Accounts,
            Uuid::new_v4(),
            Mutation::AddToStock(-1),
        )];

        assert!(matches!(
            validate_batch(&ops),
            Err(StoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn rejects_predicates_on_the_wrong_table() {
        let ops = vec![
            WriteOp::update(Table::Products, Uuid::new_v4(), Mutation::AddToStock(-1))
                .require(Predicate::BalanceAtLeast(1)),
        ];

        assert!(matches!(
            validate_batch(&ops),
            Err(StoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn require_only_extends_updates() {
        let op = WriteOp::update(Table::Products, Uuid::new_v4(), Mutation::AddToStock(-2))
            .require(Predicate::Exists)
            .require(Predicate::StockAtLeast(2));

        match op {
            WriteOp::Update { conditions, .. } => assert_eq!(
                conditions,
                vec![Predicate::Exists, Predicate::StockAtLeast(2)]
            ),
            WriteOp::Insert { .. } => unreachable!(),
        }
    }

    #[test]
    fn batch_outcomes_report_failed_operations() {
        let outcomes = [
            OpResult {
                index: 0,
                outcome: OpOutcome::Ok,
            },
            OpResult {
                index: 1,
                outcome: OpOutcome::ConditionFailed,
            },
        ];

        assert!(!outcomes.failed_condition(0));
        assert!(outcomes.failed_condition(1));
        assert!(!outcomes.has_transport_error());
    }
}
