//! API Key model for authentication.
//!
//! API keys identify the owner making a request. They are stored as SHA-256 hashes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `owner_id`: Owner the key authenticates as
/// - `owner_name`: Display name of that owner
/// - `created_at`: When the key was created
/// - `is_active`: Whether the key is currently valid
/// - `is_admin`: Whether the key may manage the product catalog
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    /// Owner of every account created with this key
    pub owner_id: Uuid,

    pub owner_name: String,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,

    pub is_admin: bool,
}
