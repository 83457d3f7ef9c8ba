//! Persisted products

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Entity, ProductInfo};

/// Content reference held by a product
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductContent {
    pub content_id: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_product_id: Option<String>,
    #[serde(default)]
    pub provided_product_ids: Vec<String>,
    #[serde(default)]
    pub product_content: Vec<ProductContent>,
}

impl Product {
    /// Build the persisted form of an imported product. Nested products and
    /// content are reduced to their ids.
    pub fn from_info(info: &ProductInfo) -> Self {
        Product {
            id: info.id.clone(),
            name: info.name.clone(),
            multiplier: info.multiplier,
            attributes: info.attributes.clone(),
            derived_product_id: info.derived_product_id().map(str::to_string),
            provided_product_ids: info.provided_products.iter().map(|p| p.id.clone()).collect(),
            product_content: info
                .product_content
                .iter()
                .map(|pc| ProductContent {
                    content_id: pc.content.id.clone(),
                    enabled: pc.enabled,
                })
                .collect(),
        }
        .normalized()
    }

    /// Reference lists sorted, so comparisons ignore upstream ordering
    pub fn normalized(mut self) -> Self {
        self.provided_product_ids.sort();
        self.provided_product_ids.dedup();
        self.product_content.sort();
        self.product_content.dedup();
        self
    }

    /// Compare own fields (including child references) against an import
    pub fn differs_from(&self, info: &ProductInfo) -> bool {
        self.clone().normalized() != Product::from_info(info)
    }
}

impl Entity for Product {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::model::{ContentInfo, ProductContentInfo};

    fn info() -> ProductInfo {
        let mut info = ProductInfo::new("prod-1", "Server");
        info.attributes.insert("arch".into(), "x86_64".into());
        info.provided_products = vec![ProductInfo::new("p-b", "B"), ProductInfo::new("p-a", "A")];
        info.product_content = vec![ProductContentInfo {
            content: ContentInfo::new("c-1", "repo-1"),
            enabled: true,
        }];
        info
    }

    #[test]
    fn test_from_info_reduces_children_to_ids() {
        let product = Product::from_info(&info());

        assert_eq!(product.provided_product_ids, vec!["p-a", "p-b"]);
        assert_eq!(product.product_content.len(), 1);
        assert_eq!(product.product_content[0].content_id, "c-1");
        assert!(product.product_content[0].enabled);
    }

    #[test]
    fn test_differs_from_ignores_reference_order() {
        let mut product = Product::from_info(&info());
        product.provided_product_ids.reverse();

        assert!(!product.differs_from(&info()));
    }

    #[test]
    fn test_differs_from_detects_attribute_change() {
        let product = Product::from_info(&info());
        let mut changed = info();
        changed.attributes.insert("sockets".into(), "2".into());

        assert!(product.differs_from(&changed));
    }

    #[test]
    fn test_differs_from_detects_content_enablement_change() {
        let product = Product::from_info(&info());
        let mut changed = info();
        changed.product_content[0].enabled = false;

        assert!(product.differs_from(&changed));
    }
}
