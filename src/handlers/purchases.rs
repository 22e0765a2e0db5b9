//! Purchase HTTP handler.

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::transaction::{PurchaseRequest, TransactionResponse},
    state::AppState,
};
use axum::{Extension, Json, extract::State};

/// Buy a product with money from one of the caller's accounts.
///
/// # Endpoint
///
/// `POST /api/v1/purchases`
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "product_id": "880e8400-...",
///   "quantity": 2,
///   "idempotency_key": "4c1d2e3f-..."
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: The purchase transaction
/// - **Error (404)**: Account or product not found
/// - **Error (422)**: `out_of_stock` or `insufficient_balance`; nothing was changed
/// - **Error (503)**: Store unavailable; retry with the same `idempotency_key`
pub async fn create_purchase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .purchases
        .purchase(
            auth.owner_id,
            request.account_id,
            request.product_id,
            request.quantity,
            request.idempotency_key,
        )
        .await?;

    Ok(Json(transaction.into()))
}
