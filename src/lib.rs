//! Ledger Service
//!
//! Accounts, an inventory catalog and purchases on top of a keyed record store. Every
//! balance and stock change is a conditioned store write committed atomically with its
//! audit record, so concurrent requests never overdraw an account or oversell a product.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Store**: PostgreSQL with sqlx behind the `LedgerStore` trait, in-memory for tests
//! - **Authentication**: API key with SHA-256 hashing
//! - **Format**: JSON requests/responses

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
mod integration_tests;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the HTTP router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    // Authenticated routes (API endpoints)
    let authenticated_routes = Router::new()
        // Account management routes
        .route(
            "/api/v1/accounts",
            post(handlers::accounts::create_account).get(handlers::accounts::list_accounts),
        )
        .route(
            "/api/v1/accounts/{id}",
            get(handlers::accounts::get_account),
        )
        .route(
            "/api/v1/accounts/{id}/transactions",
            get(handlers::accounts::list_account_transactions),
        )
        // Transaction routes
        .route(
            "/api/v1/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/api/v1/transactions/deposit",
            post(handlers::transactions::create_deposit),
        )
        .route(
            "/api/v1/transactions/transfer",
            post(handlers::transactions::create_transfer),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        // Catalog routes: any key may read, only admin keys may write
        .route(
            "/api/v1/products",
            get(handlers::products::list_products).merge(
                post(handlers::products::create_product)
                    .route_layer(axum_middleware::from_fn(middleware::auth::require_admin)),
            ),
        )
        .route(
            "/api/v1/products/{id}",
            get(handlers::products::get_product).merge(
                put(handlers::products::update_product)
                    .delete(handlers::products::delete_product)
                    .route_layer(axum_middleware::from_fn(middleware::auth::require_admin)),
            ),
        )
        .route(
            "/api/v1/purchases",
            post(handlers::purchases::create_purchase),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
