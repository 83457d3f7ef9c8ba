//! Upstream value objects

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

/// A subscription as reported by the upstream service. Each one maps to a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_product: Option<ProductInfo>,
}

impl SubscriptionInfo {
    pub fn product_id(&self) -> Option<&str> {
        self.product.as_ref().map(|p| p.id.as_str())
    }

    pub fn derived_product_id(&self) -> Option<&str> {
        self.derived_product.as_ref().map(|p| p.id.as_str())
    }
}

impl Entity for SubscriptionInfo {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// A product as reported by the upstream service, with its nested
/// provided/derived products and content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_product: Option<Box<ProductInfo>>,
    #[serde(default)]
    pub provided_products: Vec<ProductInfo>,
    #[serde(default)]
    pub product_content: Vec<ProductContentInfo>,
}

impl ProductInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ProductInfo {
            id: id.into(),
            name: name.into(),
            multiplier: None,
            attributes: BTreeMap::new(),
            derived_product: None,
            provided_products: Vec::new(),
            product_content: Vec::new(),
        }
    }

    pub fn derived_product_id(&self) -> Option<&str> {
        self.derived_product.as_ref().map(|p| p.id.as_str())
    }
}

impl Entity for ProductInfo {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Content attached to a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductContentInfo {
    pub content: ContentInfo,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub id: String,
    pub content_type: String,
    pub label: String,
    pub name: String,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_expiration: Option<i64>,
}

impl ContentInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        ContentInfo {
            id: id.into(),
            content_type: "yum".to_string(),
            name: label.clone(),
            label,
            vendor: String::new(),
            content_url: None,
            gpg_url: None,
            arches: None,
            required_tags: None,
            release_version: None,
            metadata_expiration: None,
        }
    }
}

impl Entity for ContentInfo {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Everything received from the upstream service for one owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSnapshot {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionInfo>,
    #[serde(default)]
    pub products: Vec<ProductInfo>,
    #[serde(default)]
    pub content: Vec<ContentInfo>,
}
