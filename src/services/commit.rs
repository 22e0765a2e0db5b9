//! Authoritative write operations.
//!
//! Every invariant the ledger promises is carried by the predicates attached here, and is
//! evaluated by the store in the same step as the write. Callers combine these into one
//! `atomic_batch`.

use uuid::Uuid;

use crate::{
    models::transaction::Transaction,
    store::{Mutation, Predicate, Record, Table, WriteOp},
};

/// Take `amount` from an account, only if it exists and holds at least `amount`.
pub fn debit_account(account_id: Uuid, amount: i64) -> WriteOp {
    WriteOp::update(Table::Accounts, account_id, Mutation::AddToBalance(-amount))
        .require(Predicate::Exists)
        .require(Predicate::BalanceAtLeast(amount))
}

pub fn credit_account(account_id: Uuid, amount: i64) -> WriteOp {
    WriteOp::update(Table::Accounts, account_id, Mutation::AddToBalance(amount))
        .require(Predicate::Exists)
}

/// Remove `quantity` units from a product, only if at least that many are in stock.
pub fn take_stock(product_id: Uuid, quantity: i64) -> WriteOp {
    WriteOp::update(Table::Products, product_id, Mutation::AddToStock(-quantity))
        .require(Predicate::Exists)
        .require(Predicate::StockAtLeast(quantity))
}

/// Append the audit record. Fails if the id is already taken.
pub fn record(transaction: Transaction) -> WriteOp {
    WriteOp::insert(Record::Transaction(transaction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_guards_existence_and_balance() {
        let id = Uuid::new_v4();

        assert_eq!(
            debit_account(id, 40),
            WriteOp::Update {
                table: Table::Accounts,
                key: id,
                mutation: Mutation::AddToBalance(-40),
                conditions: vec![Predicate::Exists, Predicate::BalanceAtLeast(40)],
            }
        );
    }

    #[test]
    fn take_stock_guards_existence_and_stock() {
        let id = Uuid::new_v4();

        assert_eq!(
            take_stock(id, 5),
            WriteOp::Update {
                table: Table::Products,
                key: id,
                mutation: Mutation::AddToStock(-5),
                conditions: vec![Predicate::Exists, Predicate::StockAtLeast(5)],
            }
        );
    }
}
