//! Pool refresh: keeps an owner's subscription pools in step with the
//! upstream subscription service.

pub mod cli;
pub mod config;
pub mod refresh;
pub mod store;

pub use config::Config;
pub use refresh::{RefreshError, RefreshResult, RefreshWorker};
pub use store::{MemoryStore, PoolStore, SqliteStore, StoreError};
