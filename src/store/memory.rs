use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use crate::models::{account::Account, product::Product};

use super::{
    Index, LedgerStore, Mutation, OpOutcome, OpResult, Predicate, Record, SortOrder,
    StoreError, Table, WriteOp, validate_batch, validate_update,
};

#[derive(Debug, Clone)]
struct Stored {
    /// Insertion order, used to break ties between equal timestamps.
    seq: u64,
    record: Record,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<(Table, Uuid), Stored>,
    next_seq: u64,
}

impl State {
    fn get(&self, table: Table, key: Uuid) -> Option<&Record> {
        self.records.get(&(table, key)).map(|s| &s.record)
    }

    fn insert(&mut self, record: Record) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records
            .insert((record.table(), record.id()), Stored { seq, record });
    }

    fn replace(&mut self, record: Record) {
        if let Some(stored) = self.records.get_mut(&(record.table(), record.id())) {
            stored.record = record;
        }
    }

    /// The record `mutation` would produce, or `None` if the update must fail.
    fn stage_update(
        &self,
        table: Table,
        key: Uuid,
        mutation: &Mutation,
        conditions: &[Predicate],
    ) -> Option<Record> {
        let current = self.get(table, key)?;
        if !conditions.iter().all(|p| holds(current, p)) {
            return None;
        }
        apply(current, mutation)
    }
}

fn holds(record: &Record, predicate: &Predicate) -> bool {
    match (predicate, record) {
        (Predicate::Exists, _) => true,
        (Predicate::BalanceAtLeast(min), Record::Account(a)) => a.balance >= *min,
        (Predicate::StockAtLeast(min), Record::Product(p)) => p.stock >= *min,
        _ => false,
    }
}

/// Arithmetic overflow and negative balances or stock fail the write, mirroring the
/// CHECK constraints of the Postgres schema.
fn apply(record: &Record, mutation: &Mutation) -> Option<Record> {
    match (mutation, record) {
        (Mutation::AddToBalance(delta), Record::Account(a)) => {
            let balance = a.balance.checked_add(*delta).filter(|b| *b >= 0)?;
            Some(Record::Account(Account {
                balance,
                ..a.clone()
            }))
        }
        (Mutation::AddToStock(delta), Record::Product(p)) => {
            let stock = p.stock.checked_add(*delta).filter(|s| *s >= 0)?;
            Some(Record::Product(Product {
                stock,
                ..p.clone()
            }))
        }
        (
            Mutation::ReplaceProduct {
                name,
                description,
                price,
                stock,
            },
            Record::Product(p),
        ) => {
            if *price <= 0 || *stock < 0 {
                return None;
            }
            Some(Record::Product(Product {
                name: name.clone(),
                description: description.clone(),
                price: *price,
                stock: *stock,
                ..p.clone()
            }))
        }
        _ => None,
    }
}

fn index_key(index: Index, record: &Record) -> Option<Uuid> {
    match (index, record) {
        (Index::AccountsByOwner, Record::Account(a)) => Some(a.owner_id),
        (Index::TransactionsByOwner, Record::Transaction(t)) => Some(t.owner_id),
        (Index::TransactionsByAccount, Record::Transaction(t)) => Some(t.account_id),
        _ => None,
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A single lock guards all tables, so every operation (including
/// a whole batch) is trivially serializable. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn matching<F>(&self, table: Table, keep: F, order: SortOrder) -> Result<Vec<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        let state = self.read()?;
        let mut matches: Vec<&Stored> = state
            .records
            .values()
            .filter(|s| s.record.table() == table && keep(&s.record))
            .collect();

        matches.sort_by_key(|s| (s.record.created_at(), s.seq));
        if order == SortOrder::NewestFirst {
            matches.reverse();
        }

        Ok(matches.into_iter().map(|s| s.record.clone()).collect())
    }
}

fn into_stream<'a>(
    result: Result<Vec<Record>, StoreError>,
) -> BoxStream<'a, Result<Record, StoreError>> {
    match result {
        Ok(records) => stream::iter(records.into_iter().map(Ok)).boxed(),
        Err(e) => stream::iter([Err(e)]).boxed(),
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, table: Table, key: Uuid) -> Result<Option<Record>, StoreError> {
        Ok(self.read()?.get(table, key).cloned())
    }

    async fn put_if_absent(&self, record: Record) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.get(record.table(), record.id()).is_some() {
            return Err(StoreError::AlreadyExists);
        }
        state.insert(record);
        Ok(())
    }

    async fn conditional_update(
        &self,
        table: Table,
        key: Uuid,
        mutation: Mutation,
        conditions: Vec<Predicate>,
    ) -> Result<Record, StoreError> {
        validate_update(table, Some(&mutation), &conditions)?;

        let mut state = self.write()?;
        let updated = state
            .stage_update(table, key, &mutation, &conditions)
            .ok_or(StoreError::ConditionFailed)?;
        state.replace(updated.clone());
        Ok(updated)
    }

    async fn conditional_delete(
        &self,
        table: Table,
        key: Uuid,
        conditions: Vec<Predicate>,
    ) -> Result<(), StoreError> {
        validate_update(table, None, &conditions)?;

        let mut state = self.write()?;
        let satisfied = state
            .get(table, key)
            .is_some_and(|current| conditions.iter().all(|p| holds(current, p)));
        if !satisfied {
            return Err(StoreError::ConditionFailed);
        }
        state.records.remove(&(table, key));
        Ok(())
    }

    fn query_by_index(
        &self,
        index: Index,
        key: Uuid,
        order: SortOrder,
    ) -> BoxStream<'_, Result<Record, StoreError>> {
        into_stream(self.matching(
            index.table(),
            |record| index_key(index, record) == Some(key),
            order,
        ))
    }

    fn scan(&self, table: Table) -> BoxStream<'_, Result<Record, StoreError>> {
        into_stream(self.matching(table, |_| true, SortOrder::OldestFirst))
    }

    async fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        validate_batch(&ops)?;

        let mut state = self.write()?;

        // Evaluate every operation against the pre-batch state. Targets are distinct,
        // so staged writes never observe each other.
        let mut staged = Vec::with_capacity(ops.len());
        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops.into_iter().enumerate() {
            let write = match op {
                WriteOp::Update {
                    table,
                    key,
                    mutation,
                    conditions,
                } => state
                    .stage_update(table, key, &mutation, &conditions)
                    .map(|record| (record, false)),
                WriteOp::Insert { record } => {
                    if state.get(record.table(), record.id()).is_some() {
                        None
                    } else {
                        Some((record, true))
                    }
                }
            };

            let outcome = match write {
                Some(w) => {
                    staged.push(w);
                    OpOutcome::Ok
                }
                None => OpOutcome::ConditionFailed,
            };
            results.push(OpResult { index, outcome });
        }

        if results.iter().any(|r| r.outcome != OpOutcome::Ok) {
            return Err(StoreError::BatchAborted(results));
        }

        for (record, is_insert) in staged {
            if is_insert {
                state.insert(record);
            } else {
                state.replace(record);
            }
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}
