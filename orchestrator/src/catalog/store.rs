//! Product catalog store

use std::collections::BTreeMap;

use openapi_server::models::ProductPayload;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::catalog::validation::{apply_patch, product_from_payload, validate_product};
use crate::errors::ArkError;
use crate::filesys::file::File;
use crate::models::product::Product;

/// Product definitions, optionally written through to a JSON file
pub struct ProductCatalog {
    products: RwLock<BTreeMap<String, Product>>,
    file: Option<File>,
}

impl ProductCatalog {
    /// Create an empty, memory-only catalog
    pub fn in_memory() -> Self {
        Self {
            products: RwLock::new(BTreeMap::new()),
            file: None,
        }
    }

    /// Load the catalog from `file`, starting empty when it does not exist
    pub async fn load(file: File) -> Result<Self, ArkError> {
        let stored: Vec<Product> = file.read_json_or_default().await?;
        let mut products = BTreeMap::new();
        for product in stored {
            validate_product(&product)?;
            products.insert(product.id.clone(), product);
        }
        info!(
            "Loaded {} products from {}",
            products.len(),
            file.path().display()
        );
        Ok(Self {
            products: RwLock::new(products),
            file: Some(file),
        })
    }

    async fn persist(&self, products: &BTreeMap<String, Product>) -> Result<(), ArkError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let list: Vec<&Product> = products.values().collect();
        file.write_json(&list).await
    }

    /// Create a product from a full payload
    pub async fn create(&self, payload: &ProductPayload) -> Result<Product, ArkError> {
        let product = product_from_payload(payload)?;
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(ArkError::Conflict(format!(
                "product already exists: {}",
                product.id
            )));
        }
        products.insert(product.id.clone(), product.clone());
        if let Err(e) = self.persist(&products).await {
            products.remove(&product.id);
            return Err(e);
        }
        debug!("Created product {}", product.id);
        Ok(product)
    }

    /// Get a product by id
    pub async fn get(&self, id: &str) -> Result<Product, ArkError> {
        let products = self.products.read().await;
        products
            .get(id)
            .cloned()
            .ok_or_else(|| ArkError::NotFound(format!("product not found: {}", id)))
    }

    /// All products sorted by id
    pub async fn list(&self) -> Vec<Product> {
        let products = self.products.read().await;
        products.values().cloned().collect()
    }

    /// Replace the fields present in `patch`
    pub async fn update(&self, id: &str, patch: &ProductPayload) -> Result<Product, ArkError> {
        let mut products = self.products.write().await;
        let current = products
            .get(id)
            .cloned()
            .ok_or_else(|| ArkError::NotFound(format!("product not found: {}", id)))?;
        let next = apply_patch(&current, patch)?;
        products.insert(id.to_string(), next.clone());
        if let Err(e) = self.persist(&products).await {
            products.insert(id.to_string(), current);
            return Err(e);
        }
        debug!("Updated product {}", id);
        Ok(next)
    }

    /// Remove a product. Reference checks are the caller's concern.
    pub async fn delete(&self, id: &str) -> Result<Product, ArkError> {
        let mut products = self.products.write().await;
        let removed = products
            .remove(id)
            .ok_or_else(|| ArkError::NotFound(format!("product not found: {}", id)))?;
        if let Err(e) = self.persist(&products).await {
            products.insert(id.to_string(), removed);
            return Err(e);
        }
        debug!("Deleted product {}", id);
        Ok(removed)
    }
}
