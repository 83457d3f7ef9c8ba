//! Sample entities shared by the refresh tests

use chrono::{DateTime, TimeZone, Utc};

use super::mapper::EntityMappers;
use super::model::{
    Content, ContentInfo, Pool, Product, ProductContentInfo, ProductInfo, SubscriptionInfo,
};

pub const OWNER: &str = "org-admin";

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn content_info(id: &str) -> ContentInfo {
    ContentInfo::new(id, format!("{id}-label"))
}

pub fn product_info(id: &str, content: &[&str]) -> ProductInfo {
    let mut product = ProductInfo::new(id, format!("Product {id}"));
    product.product_content = content
        .iter()
        .map(|content_id| ProductContentInfo {
            content: content_info(content_id),
            enabled: true,
        })
        .collect();
    product
}

pub fn subscription(id: &str, product: ProductInfo) -> SubscriptionInfo {
    SubscriptionInfo {
        id: id.to_string(),
        quantity: 10,
        start_date: date(2026, 1, 1),
        end_date: date(2027, 1, 1),
        contract_number: Some(format!("contract-{id}")),
        account_number: Some("account-1".to_string()),
        order_number: None,
        product: Some(product),
        derived_product: None,
    }
}

pub fn existing_pool(subscription: &SubscriptionInfo) -> Pool {
    let product_name = subscription.product.as_ref().map(|p| p.name.clone());
    Pool::from_subscription(OWNER, subscription, product_name)
}

/// Map one product tree as imported, and optionally as already persisted
fn map_product(mappers: &mut EntityMappers, product: &ProductInfo, persisted: bool) {
    for pc in &product.product_content {
        mappers.content.add_imported_entity(pc.content.clone()).unwrap();
        if persisted {
            mappers.content.add_existing_entity(Content::from_info(&pc.content)).unwrap();
        }
    }
    for provided in &product.provided_products {
        map_product(mappers, provided, persisted);
    }
    if let Some(derived) = &product.derived_product {
        map_product(mappers, derived, persisted);
    }

    mappers.products.add_imported_entity(product.clone()).unwrap();
    if persisted {
        mappers.products.add_existing_entity(Product::from_info(product)).unwrap();
    }
}

/// Mappers where every subscription is imported and, if `persisted`, also
/// already stored exactly as imported
pub fn mappers_for(subscriptions: &[SubscriptionInfo], persisted: bool) -> EntityMappers {
    let mut mappers = EntityMappers::new();
    for sub in subscriptions {
        for product in sub.product.iter().chain(sub.derived_product.iter()) {
            map_product(&mut mappers, product, persisted);
        }
        mappers.pools.add_imported_entity(sub.clone()).unwrap();
        if persisted {
            mappers.pools.add_existing_entity(existing_pool(sub)).unwrap();
        }
    }
    mappers
}
