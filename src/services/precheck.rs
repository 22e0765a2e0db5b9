//! Advisory checks over request input and point-read snapshots.
//!
//! Nothing here is authoritative. A snapshot may be stale by the time the batch commits;
//! the conditioned writes built in [`super::commit`] are what actually protect balances
//! and stock. These checks only reject obviously doomed requests early and pick the most
//! helpful error.

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{account::Account, product::Product, product::ProductRequest},
};

pub const ACCOUNT_NAME_MIN_CHARS: usize = 3;
pub const ACCOUNT_NAME_MAX_CHARS: usize = 50;

pub fn validate_account_name(name: &str) -> Result<(), AppError> {
    let chars = name.trim().chars().count();
    if !(ACCOUNT_NAME_MIN_CHARS..=ACCOUNT_NAME_MAX_CHARS).contains(&chars) {
        return Err(AppError::InvalidRequest(format!(
            "Account name must be between {ACCOUNT_NAME_MIN_CHARS} and \
             {ACCOUNT_NAME_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_amount(amount: i64) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::InvalidRequest(
            "Quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_transfer_parties(from: Uuid, to: Uuid) -> Result<(), AppError> {
    if from == to {
        return Err(AppError::InvalidRequest(
            "Cannot transfer to same account".to_string(),
        ));
    }
    Ok(())
}

/// New products must arrive with stock; replacements may set it to zero.
pub fn validate_product(request: &ProductRequest, is_new: bool) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Product name is required".to_string(),
        ));
    }
    if request.price <= 0 {
        return Err(AppError::InvalidRequest(
            "Price must be positive".to_string(),
        ));
    }
    if is_new && request.stock <= 0 {
        return Err(AppError::InvalidRequest(
            "Initial stock must be positive".to_string(),
        ));
    }
    if request.stock < 0 {
        return Err(AppError::InvalidRequest(
            "Stock cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Accounts owned by someone else are indistinguishable from missing ones.
pub fn ensure_owned(account: Account, owner_id: Uuid) -> Result<Account, AppError> {
    if account.owner_id != owner_id {
        return Err(AppError::AccountNotFound);
    }
    Ok(account)
}

pub fn purchase_cost(price: i64, quantity: i64) -> Result<i64, AppError> {
    price.checked_mul(quantity).ok_or_else(|| {
        AppError::InvalidRequest("Purchase total exceeds the supported amount".to_string())
    })
}

pub fn check_balance(account: &Account, amount: i64) -> Result<(), AppError> {
    if account.balance < amount {
        return Err(AppError::InsufficientBalance);
    }
    Ok(())
}

pub fn check_credit_fits(account: &Account, amount: i64) -> Result<(), AppError> {
    if account.balance.checked_add(amount).is_none() {
        return Err(AppError::InvalidRequest(
            "Deposit exceeds the supported balance".to_string(),
        ));
    }
    Ok(())
}

/// Stock is checked before balance.
pub fn check_purchase(
    account: &Account,
    product: &Product,
    quantity: i64,
    cost: i64,
) -> Result<(), AppError> {
    if product.stock < quantity {
        return Err(AppError::OutOfStock);
    }
    check_balance(account, cost)
}
