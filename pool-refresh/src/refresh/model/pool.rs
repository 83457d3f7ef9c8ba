//! Persisted subscription pools

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, SubscriptionInfo};

/// Kind of pool; only pools mirroring a subscription are touched by a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    #[default]
    Normal,
    Development,
    Bonus,
    EntitlementDerived,
    StackDerived,
    UnmappedGuest,
}

impl PoolType {
    /// Derived pools are maintained by the entitlement rules, not by refresh
    pub fn is_refreshable(&self) -> bool {
        matches!(self, PoolType::Normal | PoolType::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Normal => "normal",
            PoolType::Development => "development",
            PoolType::Bonus => "bonus",
            PoolType::EntitlementDerived => "entitlement_derived",
            PoolType::StackDerived => "stack_derived",
            PoolType::UnmappedGuest => "unmapped_guest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(PoolType::Normal),
            "development" => Some(PoolType::Development),
            "bonus" => Some(PoolType::Bonus),
            "entitlement_derived" => Some(PoolType::EntitlementDerived),
            "stack_derived" => Some(PoolType::StackDerived),
            "unmapped_guest" => Some(PoolType::UnmappedGuest),
            _ => None,
        }
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pool row belonging to one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Upstream subscription id the pool was created from
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub pool_type: PoolType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_product_id: Option<String>,
    /// Copied from the pool's product at refresh time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl Pool {
    /// Build the pool an imported subscription should be persisted as
    pub fn from_subscription(
        owner_id: impl Into<String>,
        subscription: &SubscriptionInfo,
        product_name: Option<String>,
    ) -> Self {
        Pool {
            id: subscription.id.clone(),
            owner_id: owner_id.into(),
            pool_type: PoolType::Normal,
            product_id: subscription.product_id().map(str::to_string),
            derived_product_id: subscription.derived_product_id().map(str::to_string),
            product_name,
            quantity: subscription.quantity,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            contract_number: subscription.contract_number.clone(),
            account_number: subscription.account_number.clone(),
            order_number: subscription.order_number.clone(),
        }
    }

    /// Fields whose value differs in `other`
    pub fn changed_fields(&self, other: &Pool) -> BTreeSet<PoolField> {
        let mut changed = BTreeSet::new();

        if self.product_id != other.product_id {
            changed.insert(PoolField::ProductId);
        }
        if self.derived_product_id != other.derived_product_id {
            changed.insert(PoolField::DerivedProductId);
        }
        if self.product_name != other.product_name {
            changed.insert(PoolField::ProductName);
        }
        if self.quantity != other.quantity {
            changed.insert(PoolField::Quantity);
        }
        if self.start_date != other.start_date {
            changed.insert(PoolField::StartDate);
        }
        if self.end_date != other.end_date {
            changed.insert(PoolField::EndDate);
        }
        if self.contract_number != other.contract_number {
            changed.insert(PoolField::ContractNumber);
        }
        if self.account_number != other.account_number {
            changed.insert(PoolField::AccountNumber);
        }
        if self.order_number != other.order_number {
            changed.insert(PoolField::OrderNumber);
        }

        changed
    }

    /// Compare the pool's own fields against an imported subscription.
    ///
    /// Fields copied from the product are ignored here; product changes reach
    /// the pool through its child node instead.
    pub fn differs_from(&self, subscription: &SubscriptionInfo) -> bool {
        let imported = Pool::from_subscription(
            self.owner_id.clone(),
            subscription,
            self.product_name.clone(),
        );

        self.changed_fields(&imported)
            .iter()
            .any(|field| !field.is_derived())
    }

    /// Copy the given fields from `source` onto this pool
    pub fn apply_fields(&mut self, source: &Pool, fields: &BTreeSet<PoolField>) {
        for field in fields {
            match field {
                PoolField::ProductId => self.product_id = source.product_id.clone(),
                PoolField::DerivedProductId => {
                    self.derived_product_id = source.derived_product_id.clone()
                }
                PoolField::ProductName => self.product_name = source.product_name.clone(),
                PoolField::Quantity => self.quantity = source.quantity,
                PoolField::StartDate => self.start_date = source.start_date,
                PoolField::EndDate => self.end_date = source.end_date,
                PoolField::ContractNumber => self.contract_number = source.contract_number.clone(),
                PoolField::AccountNumber => self.account_number = source.account_number.clone(),
                PoolField::OrderNumber => self.order_number = source.order_number.clone(),
            }
        }
    }
}

impl Entity for Pool {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Updatable pool columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolField {
    ProductId,
    DerivedProductId,
    ProductName,
    Quantity,
    StartDate,
    EndDate,
    ContractNumber,
    AccountNumber,
    OrderNumber,
}

impl PoolField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolField::ProductId => "product_id",
            PoolField::DerivedProductId => "derived_product_id",
            PoolField::ProductName => "product_name",
            PoolField::Quantity => "quantity",
            PoolField::StartDate => "start_date",
            PoolField::EndDate => "end_date",
            PoolField::ContractNumber => "contract_number",
            PoolField::AccountNumber => "account_number",
            PoolField::OrderNumber => "order_number",
        }
    }

    /// Whether the field is copied from a child entity rather than imported
    pub fn is_derived(&self) -> bool {
        matches!(self, PoolField::ProductName)
    }
}

impl std::fmt::Display for PoolField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
