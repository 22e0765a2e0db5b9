//! Postgres-backed ledger store.
//!
//! Conditional writes map onto single SQL statements whose `WHERE` clause carries the
//! predicate, so the check and the write are one atomic step inside Postgres:
//!
//! | Store operation            | SQL                                                      |
//! |----------------------------|----------------------------------------------------------|
//! | `put_if_absent` / insert   | `INSERT … ON CONFLICT (id) DO NOTHING` (0 rows = exists) |
//! | `conditional_update`       | `UPDATE … WHERE id = $1 AND <predicates>` (0 rows = failed) |
//! | `conditional_delete`       | `DELETE … WHERE id = $1 AND <predicates>`                |
//! | `atomic_batch`             | one database transaction, rolled back on any failed op   |
//!
//! Batch operations execute in `(table, key)` order, whatever order the caller listed
//! them in. Row locks are then always taken in the same order, so opposing transfers
//! between two accounts wait on each other instead of deadlocking.
//!
//! ## Error Mapping
//!
//! | SQLx Error                                  | StoreError / OpOutcome            |
//! |---------------------------------------------|-----------------------------------|
//! | Io, Tls, PoolTimedOut, PoolClosed, Protocol | `Unavailable`                     |
//! | CHECK violation (`23514`), overflow (`22003`) | `ConditionFailed` (per operation in a batch) |
//! | Other statement error inside a batch        | `OpOutcome::TransportError`       |
//! | Anything else                               | `Backend`                         |
//!
//! Calls that exceed the configured timeout return `StoreError::Timeout`. For writes the
//! outcome is then unknown.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::{Executor, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{account::Account, product::Product, transaction::Transaction};

use super::{
    Index, LedgerStore, Mutation, OpOutcome, OpResult, Predicate, Record, SortOrder,
    StoreError, Table, WriteOp, validate_batch, validate_update,
};

const ACCOUNT_COLUMNS: &str = "id, owner_id, account_name, balance, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, created_at";
const TRANSACTION_COLUMNS: &str = "id, owner_id, account_id, counterparty_account_id, product_id, \
     quantity, unit_price, total_amount, kind, side, created_at";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

// SQLSTATE for bigint overflow in `balance + $1`
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// CHECK violations and arithmetic overflow reject the write like a failed predicate.
fn is_rejected_write(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| {
        db.is_check_violation() || db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE)
    })
}

fn write_error(e: sqlx::Error) -> StoreError {
    if is_rejected_write(&e) {
        StoreError::ConditionFailed
    } else {
        e.into()
    }
}

fn columns(table: Table) -> &'static str {
    match table {
        Table::Accounts => ACCOUNT_COLUMNS,
        Table::Products => PRODUCT_COLUMNS,
        Table::Transactions => TRANSACTION_COLUMNS,
    }
}

fn push_conditions(qb: &mut QueryBuilder<'static, Postgres>, conditions: &[Predicate]) {
    for predicate in conditions {
        match predicate {
            // An UPDATE or DELETE only ever touches an existing row.
            Predicate::Exists => {}
            Predicate::BalanceAtLeast(min) => {
                qb.push(" AND balance >= ").push_bind(*min);
            }
            Predicate::StockAtLeast(min) => {
                qb.push(" AND stock >= ").push_bind(*min);
            }
        }
    }
}

fn update_query(
    table: Table,
    key: Uuid,
    mutation: &Mutation,
    conditions: &[Predicate],
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", table.name()));
    match mutation {
        Mutation::AddToBalance(delta) => {
            qb.push("balance = balance + ").push_bind(*delta);
        }
        Mutation::AddToStock(delta) => {
            qb.push("stock = stock + ").push_bind(*delta);
        }
        Mutation::ReplaceProduct {
            name,
            description,
            price,
            stock,
        } => {
            qb.push("name = ")
                .push_bind(name.clone())
                .push(", description = ")
                .push_bind(description.clone())
                .push(", price = ")
                .push_bind(*price)
                .push(", stock = ")
                .push_bind(*stock);
        }
    }
    qb.push(" WHERE id = ").push_bind(key);
    push_conditions(&mut qb, conditions);
    qb
}

/// Insert a record unless its id exists. Returns whether a row was written.
async fn insert_record<'c, E>(executor: E, record: &Record) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = match record {
        Record::Account(a) => {
            sqlx::query(
                r#"
                INSERT INTO accounts (id, owner_id, account_name, balance, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(a.id)
            .bind(a.owner_id)
            .bind(a.account_name.clone())
            .bind(a.balance)
            .bind(a.created_at)
            .execute(executor)
            .await?
        }
        Record::Product(p) => {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, description, price, stock, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(p.id)
            .bind(p.name.clone())
            .bind(p.description.clone())
            .bind(p.price)
            .bind(p.stock)
            .bind(p.created_at)
            .execute(executor)
            .await?
        }
        Record::Transaction(t) => {
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    id,
                    owner_id,
                    account_id,
                    counterparty_account_id,
                    product_id,
                    quantity,
                    unit_price,
                    total_amount,
                    kind,
                    side,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(t.id)
            .bind(t.owner_id)
            .bind(t.account_id)
            .bind(t.counterparty_account_id)
            .bind(t.product_id)
            .bind(t.quantity)
            .bind(t.unit_price)
            .bind(t.total_amount)
            .bind(t.kind.as_str())
            .bind(t.side.as_str())
            .bind(t.created_at)
            .execute(executor)
            .await?
        }
    };

    Ok(result.rows_affected() == 1)
}

/// Run one batch operation. `Ok(false)` means its condition did not hold.
async fn execute_op(conn: &mut PgConnection, op: &WriteOp) -> Result<bool, sqlx::Error> {
    match op {
        WriteOp::Update {
            table,
            key,
            mutation,
            conditions,
        } => {
            let mut qb = update_query(*table, *key, mutation, conditions);
            let result = qb.build().execute(&mut *conn).await?;
            Ok(result.rows_affected() == 1)
        }
        WriteOp::Insert { record } => insert_record(&mut *conn, record).await,
    }
}

/// Positions of `ops` in execution order: by table, then key.
fn lock_order(ops: &[WriteOp]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ops.len()).collect();
    order.sort_by_key(|&i| ops[i].target());
    order
}

fn index_sql(index: Index, order: SortOrder) -> &'static str {
    match (index, order) {
        (Index::AccountsByOwner, SortOrder::OldestFirst) => {
            "SELECT id, owner_id, account_name, balance, created_at FROM accounts \
             WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        }
        (Index::AccountsByOwner, SortOrder::NewestFirst) => {
            "SELECT id, owner_id, account_name, balance, created_at FROM accounts \
             WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        }
        (Index::TransactionsByOwner, SortOrder::OldestFirst) => {
            "SELECT id, owner_id, account_id, counterparty_account_id, product_id, quantity, \
             unit_price, total_amount, kind, side, created_at FROM transactions \
             WHERE owner_id = $1 ORDER BY created_at ASC, seq ASC"
        }
        (Index::TransactionsByOwner, SortOrder::NewestFirst) => {
            "SELECT id, owner_id, account_id, counterparty_account_id, product_id, quantity, \
             unit_price, total_amount, kind, side, created_at FROM transactions \
             WHERE owner_id = $1 ORDER BY created_at DESC, seq DESC"
        }
        (Index::TransactionsByAccount, SortOrder::OldestFirst) => {
            "SELECT id, owner_id, account_id, counterparty_account_id, product_id, quantity, \
             unit_price, total_amount, kind, side, created_at FROM transactions \
             WHERE account_id = $1 ORDER BY created_at ASC, seq ASC"
        }
        (Index::TransactionsByAccount, SortOrder::NewestFirst) => {
            "SELECT id, owner_id, account_id, counterparty_account_id, product_id, quantity, \
             unit_price, total_amount, kind, side, created_at FROM transactions \
             WHERE account_id = $1 ORDER BY created_at DESC, seq DESC"
        }
    }
}

/// Postgres implementation of [`LedgerStore`].
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
    call_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool, call_timeout: Duration) -> Self {
        Self { pool, call_timeout }
    }

    async fn with_timeout<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn fetch_one_record(
        &self,
        table: Table,
        qb: &mut QueryBuilder<'static, Postgres>,
    ) -> Result<Option<Record>, sqlx::Error> {
        let record = match table {
            Table::Accounts => qb
                .build_query_as::<Account>()
                .fetch_optional(&self.pool)
                .await?
                .map(Record::Account),
            Table::Products => qb
                .build_query_as::<Product>()
                .fetch_optional(&self.pool)
                .await?
                .map(Record::Product),
            Table::Transactions => qb
                .build_query_as::<Transaction>()
                .fetch_optional(&self.pool)
                .await?
                .map(Record::Transaction),
        };
        Ok(record)
    }

    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut results: Vec<OpResult> = Vec::with_capacity(ops.len());
        // Postgres refuses further statements once one has failed inside a transaction.
        let mut poisoned = false;
        for index in lock_order(&ops) {
            let outcome = if poisoned {
                OpOutcome::TransportError
            } else {
                match execute_op(&mut *tx, &ops[index]).await {
                    Ok(true) => OpOutcome::Ok,
                    Ok(false) => OpOutcome::ConditionFailed,
                    Err(e) if is_connection_error(&e) => return Err(e.into()),
                    Err(e) if is_rejected_write(&e) => {
                        poisoned = true;
                        OpOutcome::ConditionFailed
                    }
                    Err(e) => {
                        tracing::warn!(index, error = %e, "batch operation failed");
                        poisoned = true;
                        OpOutcome::TransportError
                    }
                }
            };
            results.push(OpResult { index, outcome });
        }
        results.sort_by_key(|r| r.index);

        if results.iter().any(|r| r.outcome != OpOutcome::Ok) {
            tx.rollback().await?;
            return Err(StoreError::BatchAborted(results));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn get(&self, table: Table, key: Uuid) -> Result<Option<Record>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE id = ",
            columns(table),
            table.name()
        ));
        qb.push_bind(key);
        self.with_timeout(async { Ok(self.fetch_one_record(table, &mut qb).await?) })
            .await
    }

    #[instrument(skip(self, record), fields(table = record.table().name(), id = %record.id()))]
    async fn put_if_absent(&self, record: Record) -> Result<(), StoreError> {
        let inserted = self
            .with_timeout(async { Ok(insert_record(&self.pool, &record).await?) })
            .await?;
        if inserted {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }

    #[instrument(skip(self, mutation, conditions))]
    async fn conditional_update(
        &self,
        table: Table,
        key: Uuid,
        mutation: Mutation,
        conditions: Vec<Predicate>,
    ) -> Result<Record, StoreError> {
        validate_update(table, Some(&mutation), &conditions)?;

        let mut qb = update_query(table, key, &mutation, &conditions);
        qb.push(" RETURNING ").push(columns(table));
        self.with_timeout(async {
            self.fetch_one_record(table, &mut qb)
                .await
                .map_err(write_error)
        })
        .await?
        .ok_or(StoreError::ConditionFailed)
    }

    #[instrument(skip(self, conditions))]
    async fn conditional_delete(
        &self,
        table: Table,
        key: Uuid,
        conditions: Vec<Predicate>,
    ) -> Result<(), StoreError> {
        validate_update(table, None, &conditions)?;

        let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", table.name()));
        qb.push_bind(key);
        push_conditions(&mut qb, &conditions);

        let result = self
            .with_timeout(async { Ok(qb.build().execute(&self.pool).await?) })
            .await?;
        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(StoreError::ConditionFailed)
        }
    }

    fn query_by_index(
        &self,
        index: Index,
        key: Uuid,
        order: SortOrder,
    ) -> BoxStream<'_, Result<Record, StoreError>> {
        let sql = index_sql(index, order);
        match index.table() {
            Table::Accounts => sqlx::query_as::<_, Account>(sql)
                .bind(key)
                .fetch(&self.pool)
                .map_ok(Record::Account)
                .map_err(StoreError::from)
                .boxed(),
            Table::Transactions => sqlx::query_as::<_, Transaction>(sql)
                .bind(key)
                .fetch(&self.pool)
                .map_ok(Record::Transaction)
                .map_err(StoreError::from)
                .boxed(),
            Table::Products => stream::iter([Err(StoreError::InvalidOperation(format!(
                "{} is not an index of products",
                index.name()
            )))])
            .boxed(),
        }
    }

    fn scan(&self, table: Table) -> BoxStream<'_, Result<Record, StoreError>> {
        match table {
            Table::Accounts => sqlx::query_as::<_, Account>(
                "SELECT id, owner_id, account_name, balance, created_at FROM accounts \
                 ORDER BY created_at ASC",
            )
            .fetch(&self.pool)
            .map_ok(Record::Account)
            .map_err(StoreError::from)
            .boxed(),
            Table::Products => sqlx::query_as::<_, Product>(
                "SELECT id, name, description, price, stock, created_at FROM products \
                 ORDER BY created_at ASC",
            )
            .fetch(&self.pool)
            .map_ok(Record::Product)
            .map_err(StoreError::from)
            .boxed(),
            Table::Transactions => sqlx::query_as::<_, Transaction>(
                "SELECT id, owner_id, account_id, counterparty_account_id, product_id, quantity, \
                 unit_price, total_amount, kind, side, created_at FROM transactions \
                 ORDER BY created_at ASC, seq ASC",
            )
            .fetch(&self.pool)
            .map_ok(Record::Transaction)
            .map_err(StoreError::from)
            .boxed(),
        }
    }

    #[instrument(skip(self, ops), fields(op_count = ops.len()))]
    async fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        validate_batch(&ops)?;
        if ops.is_empty() {
            return Ok(());
        }

        self.with_timeout(self.run_batch(ops)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_timeout(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::transaction::Transaction;

    fn account(id: Uuid) -> Account {
        Account {
            id,
            owner_id: Uuid::new_v4(),
            account_name: "Checking".to_string(),
            balance: 100,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn opposing_transfers_lock_accounts_in_the_same_order() {
        let (low, high) = {
            let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
            if a < b { (a, b) } else { (b, a) }
        };
        let transfer = |from: Uuid, to: Uuid| {
            let entry = Transaction::transfer(Uuid::new_v4(), &account(from), to, 10, Utc::now());
            vec![
                WriteOp::update(Table::Accounts, from, Mutation::AddToBalance(-10)),
                WriteOp::update(Table::Accounts, to, Mutation::AddToBalance(10)),
                WriteOp::insert(Record::Transaction(entry)),
            ]
        };

        let forward = transfer(low, high);
        let backward = transfer(high, low);
        let targets = |ops: &[WriteOp]| -> Vec<(Table, Uuid)> {
            lock_order(ops).into_iter().map(|i| ops[i].target()).collect()
        };

        assert_eq!(lock_order(&forward), vec![0, 1, 2]);
        assert_eq!(lock_order(&backward), vec![1, 0, 2]);
        assert_eq!(targets(&forward)[..2], targets(&backward)[..2]);
    }
}
