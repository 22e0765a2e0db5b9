//! Product catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a product record from the store.
///
/// # Store Table
///
/// Maps to the `products` table (primary key only, no secondary index).
///
/// `price` is in cents and always positive. `stock` never drops below zero: catalog
/// updates replace it wholesale and purchases decrement it through a conditioned write.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating or replacing a product.
///
/// Updates are full replacements, so the same shape serves both endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Wireless Headphones",
///   "description": "Noise-cancelling, 30-hour battery",
///   "price": 29900,
///   "stock": 150
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Unit price in cents
    pub price: i64,

    pub stock: i64,
}
