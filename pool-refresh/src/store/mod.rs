//! Storage collaborators of a refresh
//!
//! A store supplies an owner's persisted pools, products and content, and
//! opens transactions in which a batch of pool writes is applied. Dropping a
//! transaction without committing it discards every staged write.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoreStats};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::refresh::model::{Content, Pool, Product};
use crate::refresh::operations::PoolUpdate;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Transaction already finished")]
    TransactionClosed,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::Lock(err.to_string())
    }
}

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn list_pools(&self, owner_id: &str) -> Result<Vec<Pool>, StoreError>;

    async fn list_products(&self, owner_id: &str) -> Result<Vec<Product>, StoreError>;

    async fn list_content(&self, owner_id: &str) -> Result<Vec<Content>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn PoolTransaction>, StoreError>;
}

#[async_trait]
pub trait PoolTransaction: Send {
    async fn create_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError>;

    async fn update_pools(&mut self, updates: &[PoolUpdate]) -> Result<(), StoreError>;

    async fn delete_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError>;

    /// Insert or replace products of one owner
    async fn save_products(&mut self, owner_id: &str, products: &[Product]) -> Result<(), StoreError>;

    async fn remove_products(&mut self, owner_id: &str, product_ids: &[String]) -> Result<(), StoreError>;

    /// Insert or replace content of one owner
    async fn save_content(&mut self, owner_id: &str, content: &[Content]) -> Result<(), StoreError>;

    async fn remove_content(&mut self, owner_id: &str, content_ids: &[String]) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
