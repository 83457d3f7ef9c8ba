//! Existing-vs-imported entity lookup, per entity type

use std::collections::{BTreeSet, HashMap};

use super::error::{RefreshError, Result};
use super::model::{
    Content, ContentInfo, Entity, Pool, Product, ProductInfo, SubscriptionInfo,
};
use super::node::EntityType;

/// Existing and imported versions of every entity of one type for one owner
#[derive(Debug, Clone)]
pub struct EntityMapper<E, I> {
    entity_type: EntityType,
    existing: HashMap<String, E>,
    imported: HashMap<String, I>,
}

impl<E: Entity, I: Entity> EntityMapper<E, I> {
    pub fn new(entity_type: EntityType) -> Self {
        EntityMapper {
            entity_type,
            existing: HashMap::new(),
            imported: HashMap::new(),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn require_id(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(RefreshError::MissingId {
                entity_type: self.entity_type,
            });
        }
        Ok(())
    }

    /// Map a persisted entity. Returns the entity it replaced, if any.
    pub fn add_existing_entity(&mut self, entity: E) -> Result<Option<E>> {
        self.require_id(entity.entity_id())?;
        Ok(self.existing.insert(entity.entity_id().to_string(), entity))
    }

    pub fn add_existing_entities(&mut self, entities: impl IntoIterator<Item = E>) -> Result<()> {
        for entity in entities {
            self.add_existing_entity(entity)?;
        }
        Ok(())
    }

    /// Map an imported entity. Returns the entity it replaced, if any.
    pub fn add_imported_entity(&mut self, entity: I) -> Result<Option<I>> {
        self.require_id(entity.entity_id())?;
        Ok(self.imported.insert(entity.entity_id().to_string(), entity))
    }

    pub fn add_imported_entities(&mut self, entities: impl IntoIterator<Item = I>) -> Result<()> {
        for entity in entities {
            self.add_imported_entity(entity)?;
        }
        Ok(())
    }

    /// Whether the id is known in either version
    pub fn has_entity(&self, id: &str) -> bool {
        self.existing.contains_key(id) || self.imported.contains_key(id)
    }

    pub fn existing_entity(&self, id: &str) -> Option<&E> {
        self.existing.get(id)
    }

    pub fn imported_entity(&self, id: &str) -> Option<&I> {
        self.imported.get(id)
    }

    pub fn existing_entities(&self) -> &HashMap<String, E> {
        &self.existing
    }

    pub fn imported_entities(&self) -> &HashMap<String, I> {
        &self.imported
    }

    /// Every mapped id, sorted
    pub fn entity_ids(&self) -> BTreeSet<&str> {
        self.existing
            .keys()
            .chain(self.imported.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn clear_existing_entities(&mut self) {
        self.existing.clear();
    }

    pub fn clear(&mut self) {
        self.existing.clear();
        self.imported.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty() && self.imported.is_empty()
    }
}

pub type PoolMapper = EntityMapper<Pool, SubscriptionInfo>;
pub type ProductMapper = EntityMapper<Product, ProductInfo>;
pub type ContentMapper = EntityMapper<Content, ContentInfo>;

/// The mappers of every type taking part in a refresh
#[derive(Debug, Clone)]
pub struct EntityMappers {
    pub pools: PoolMapper,
    pub products: ProductMapper,
    pub content: ContentMapper,
}

impl EntityMappers {
    pub fn new() -> Self {
        EntityMappers {
            pools: EntityMapper::new(EntityType::Pool),
            products: EntityMapper::new(EntityType::Product),
            content: EntityMapper::new(EntityType::Content),
        }
    }

    pub fn has_entity(&self, entity_type: EntityType, id: &str) -> bool {
        match entity_type {
            EntityType::Pool => self.pools.has_entity(id),
            EntityType::Product => self.products.has_entity(id),
            EntityType::Content => self.content.has_entity(id),
        }
    }

    pub fn entity_ids(&self, entity_type: EntityType) -> BTreeSet<&str> {
        match entity_type {
            EntityType::Pool => self.pools.entity_ids(),
            EntityType::Product => self.products.entity_ids(),
            EntityType::Content => self.content.entity_ids(),
        }
    }

    pub fn clear_existing_entities(&mut self) {
        self.pools.clear_existing_entities();
        self.products.clear_existing_entities();
        self.content.clear_existing_entities();
    }

    pub fn clear(&mut self) {
        self.pools.clear();
        self.products.clear();
        self.content.clear();
    }
}

impl Default for EntityMappers {
    fn default() -> Self {
        EntityMappers::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(id: &str) -> Content {
        Content::from_info(&ContentInfo::new(id, "label"))
    }

    #[test]
    fn test_has_entity_checks_both_versions() {
        let mut mapper = ContentMapper::new(EntityType::Content);
        mapper.add_existing_entity(content("existing")).unwrap();
        mapper.add_imported_entity(ContentInfo::new("imported", "label")).unwrap();

        assert!(mapper.has_entity("existing"));
        assert!(mapper.has_entity("imported"));
        assert!(!mapper.has_entity("missing"));
        assert!(mapper.imported_entity("existing").is_none());
        assert!(mapper.existing_entity("imported").is_none());
    }

    #[test]
    fn test_add_imported_entity_rejects_empty_id() {
        let mut mapper = ContentMapper::new(EntityType::Content);
        let err = mapper.add_imported_entity(ContentInfo::new("", "label")).unwrap_err();

        assert!(matches!(
            err,
            RefreshError::MissingId {
                entity_type: EntityType::Content
            }
        ));
    }

    #[test]
    fn test_add_imported_entity_replaces_previous_version() {
        let mut mapper = ContentMapper::new(EntityType::Content);
        assert!(mapper.add_imported_entity(ContentInfo::new("c-1", "first")).unwrap().is_none());

        let replaced = mapper.add_imported_entity(ContentInfo::new("c-1", "second")).unwrap();
        assert_eq!(replaced.map(|c| c.label), Some("first".to_string()));
        assert_eq!(mapper.imported_entity("c-1").unwrap().label, "second");
    }

    #[test]
    fn test_entity_ids_is_sorted_union() {
        let mut mapper = ContentMapper::new(EntityType::Content);
        mapper.add_existing_entity(content("b")).unwrap();
        mapper.add_existing_entity(content("a")).unwrap();
        mapper.add_imported_entity(ContentInfo::new("b", "label")).unwrap();
        mapper.add_imported_entity(ContentInfo::new("c", "label")).unwrap();

        assert_eq!(mapper.entity_ids().into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear_existing_keeps_imports() {
        let mut mappers = EntityMappers::new();
        mappers.content.add_existing_entity(content("a")).unwrap();
        mappers.content.add_imported_entity(ContentInfo::new("b", "label")).unwrap();

        mappers.clear_existing_entities();
        assert!(!mappers.has_entity(EntityType::Content, "a"));
        assert!(mappers.has_entity(EntityType::Content, "b"));

        mappers.clear();
        assert!(mappers.content.is_empty());
    }
}
