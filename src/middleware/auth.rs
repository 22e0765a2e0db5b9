//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and verify it exists in the database
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! [`require_admin`] runs after it on catalog writes and rejects non-admin keys with 403.

use crate::{error::AppError, models::api_key::ApiKey, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>` and pass `owner_id` into every
/// service call, which scopes accounts and transactions to the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub owner_id: Uuid,

    pub owner_name: String,

    /// Admin keys may create, update and delete products.
    pub is_admin: bool,
}

/// Hex-encoded SHA-256 of a raw API key, as stored in `api_keys.key_hash`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Query database for matching hash where `is_active = true`
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_api_key(api_key);

    let api_key_record = sqlx::query_as::<_, ApiKey>(
        "SELECT id, key_hash, owner_id, owner_name, created_at, is_active, is_admin
         FROM api_keys
         WHERE key_hash = $1 AND is_active = true",
    )
    .bind(&key_hash)
    .fetch_optional(&state.keys)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    tracing::debug!(
        api_key_id = %api_key_record.id,
        owner = %api_key_record.owner_name,
        is_admin = api_key_record.is_admin,
        "request authenticated"
    );

    request.extensions_mut().insert(AuthContext {
        owner_id: api_key_record.owner_id,
        owner_name: api_key_record.owner_name,
        is_admin: api_key_record.is_admin,
    });

    Ok(next.run(request).await)
}

/// Admin gate for catalog writes.
///
/// Must be layered inside [`auth_middleware`]: a request without an `AuthContext` is
/// treated as unauthenticated.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::InvalidApiKey)?;

    if !auth.is_admin {
        tracing::debug!(owner = %auth.owner_name, "catalog write refused");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
