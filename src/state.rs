//! Shared application state handed to every handler.

use crate::{
    db::DbPool,
    services::{AccountLedger, InventoryCatalog, PurchaseOrchestrator, TransactionLog},
    store::SharedStore,
};

/// Every service holds a clone of the same store handle.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountLedger,
    pub catalog: InventoryCatalog,
    pub purchases: PurchaseOrchestrator,
    pub transactions: TransactionLog,
    pub store: SharedStore,

    /// API key lookups for the auth middleware
    pub keys: DbPool,
}

impl AppState {
    pub fn new(store: SharedStore, keys: DbPool) -> Self {
        let transactions = TransactionLog::new(store.clone());
        let accounts = AccountLedger::new(store.clone(), transactions.clone());
        let catalog = InventoryCatalog::new(store.clone());
        let purchases = PurchaseOrchestrator::new(
            store.clone(),
            accounts.clone(),
            catalog.clone(),
            transactions.clone(),
        );

        Self {
            accounts,
            catalog,
            purchases,
            transactions,
            store,
            keys,
        }
    }
}
