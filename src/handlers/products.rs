//! Product catalog HTTP handlers.
//!
//! - POST /api/v1/products - Create product (admin)
//! - GET /api/v1/products - List products
//! - GET /api/v1/products/{id} - Get product
//! - PUT /api/v1/products/{id} - Replace product (admin)
//! - DELETE /api/v1/products/{id} - Delete product (admin)
//!
//! The catalog is shared by all authenticated callers.

use crate::{
    error::AppError,
    models::product::{Product, ProductRequest},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.create_product(request).await?))
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.catalog.list_products().await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.get_product(product_id).await?))
}

/// Full replacement; every field must be supplied.
pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.update_product(product_id, request).await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
