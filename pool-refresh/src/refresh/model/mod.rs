//! Entity types handled by a refresh
//!
//! Persisted entities (`Pool`, `Product`, `Content`) are the rows an owner
//! already has; the `*Info` types are the value objects received from the
//! upstream subscription service.

mod content;
mod imported;
mod pool;
mod product;

pub use content::*;
pub use imported::*;
pub use pool::*;
pub use product::*;

use serde::{Deserialize, Serialize};

/// Anything that can be mapped by its upstream id
pub trait Entity {
    fn entity_id(&self) -> &str;
}

/// Existing entities for one owner, as loaded from (or seeded into) storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExistingSnapshot {
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub content: Vec<Content>,
}
