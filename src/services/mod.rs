//! Business logic services.
//!
//! Services contain the ledger's core logic, separated from HTTP handlers. They share one
//! store handle and never lock anything in process: every invariant is carried by a
//! conditioned store write.

pub mod account_ledger;
pub mod commit;
pub mod inventory_catalog;
pub mod precheck;
pub mod purchase_orchestrator;
pub mod transaction_log;

pub use account_ledger::AccountLedger;
pub use inventory_catalog::InventoryCatalog;
pub use purchase_orchestrator::PurchaseOrchestrator;
pub use transaction_log::TransactionLog;
