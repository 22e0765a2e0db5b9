//! Product catalog with stock tracking.
//!
//! The catalog only creates, replaces and deletes products. Stock is decremented by the
//! purchase orchestrator through a conditioned write, never here.

use chrono::Utc;
use futures_util::{StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::product::{Product, ProductRequest},
    services::precheck,
    store::{Mutation, Predicate, Record, SharedStore, StoreError, Table},
};

#[derive(Clone)]
pub struct InventoryCatalog {
    store: SharedStore,
}

impl InventoryCatalog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// - `InvalidRequest`: empty name, non-positive price or non-positive stock
    /// - `Conflict`: generated id already taken
    pub async fn create_product(&self, request: ProductRequest) -> Result<Product, AppError> {
        precheck::validate_product(&request, true)?;

        let product = Product {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            price: request.price,
            stock: request.stock,
            created_at: Utc::now(),
        };

        match self.store.put_if_absent(Record::Product(product.clone())).await {
            Ok(()) => {
                tracing::info!(product_id = %product.id, stock = product.stock, "product created");
                Ok(product)
            }
            Err(StoreError::AlreadyExists) => Err(AppError::Conflict(format!(
                "product {} already exists",
                product.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<Product, AppError> {
        self.store
            .get(Table::Products, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?
            .into_product()
            .map_err(Into::into)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let products: Vec<Product> = self
            .store
            .scan(Table::Products)
            .map(|record| record.and_then(Record::into_product))
            .try_collect()
            .await?;
        Ok(products)
    }

    /// Replace every mutable field of an existing product.
    ///
    /// Stock may be set to zero here, unlike at creation.
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: ProductRequest,
    ) -> Result<Product, AppError> {
        precheck::validate_product(&request, false)?;

        let mutation = Mutation::ReplaceProduct {
            name: request.name,
            description: request.description,
            price: request.price,
            stock: request.stock,
        };

        match self
            .store
            .conditional_update(Table::Products, product_id, mutation, vec![Predicate::Exists])
            .await
        {
            Ok(record) => {
                let product = record.into_product()?;
                tracing::info!(%product_id, stock = product.stock, "product updated");
                Ok(product)
            }
            Err(StoreError::ConditionFailed) => Err(AppError::ProductNotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), AppError> {
        match self
            .store
            .conditional_delete(Table::Products, product_id, vec![Predicate::Exists])
            .await
        {
            Ok(()) => {
                tracing::info!(%product_id, "product deleted");
                Ok(())
            }
            Err(StoreError::ConditionFailed) => Err(AppError::ProductNotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn catalog() -> InventoryCatalog {
        InventoryCatalog::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn request(name: &str, price: i64, stock: i64) -> ProductRequest {
        ProductRequest {
            name: name.to_string(),
            description: "Noise-cancelling".to_string(),
            price,
            stock,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let catalog = catalog();

        let product = catalog
            .create_product(request("Headphones", 29_900, 150))
            .await
            .unwrap();

        assert_eq!(catalog.get_product(product.id).await.unwrap(), product);
        assert_eq!(catalog.list_products().await.unwrap(), vec![product]);
    }

    #[tokio::test]
    async fn create_requires_initial_stock() {
        let catalog = catalog();

        assert!(matches!(
            catalog.create_product(request("Headphones", 29_900, 0)).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(catalog.list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_all_fields() {
        let catalog = catalog();
        let product = catalog
            .create_product(request("Headphones", 29_900, 150))
            .await
            .unwrap();

        let updated = catalog
            .update_product(product.id, request("Headphones v2", 31_900, 0))
            .await
            .unwrap();

        assert_eq!(updated.id, product.id);
        assert_eq!(updated.name, "Headphones v2");
        assert_eq!(updated.price, 31_900);
        assert_eq!(updated.stock, 0);
        assert_eq!(updated.created_at, product.created_at);
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_products_are_not_found() {
        let catalog = catalog();

        assert!(matches!(
            catalog
                .update_product(Uuid::new_v4(), request("Ghost", 100, 1))
                .await,
            Err(AppError::ProductNotFound)
        ));
        assert!(matches!(
            catalog.delete_product(Uuid::new_v4()).await,
            Err(AppError::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn deleted_products_are_gone() {
        let catalog = catalog();
        let product = catalog
            .create_product(request("Headphones", 29_900, 150))
            .await
            .unwrap();

        catalog.delete_product(product.id).await.unwrap();

        assert!(matches!(
            catalog.get_product(product.id).await,
            Err(AppError::ProductNotFound)
        ));
        assert!(matches!(
            catalog.delete_product(product.id).await,
            Err(AppError::ProductNotFound)
        ));
    }
}
