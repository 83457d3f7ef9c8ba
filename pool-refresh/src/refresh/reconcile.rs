//! Diff pass over a built graph, and its linearization into pool operations

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::builders::NodeBuilder;
use super::error::{RefreshError, Result};
use super::model::{Content, Pool, Product, SubscriptionInfo};
use super::node::{ChangeState, EntityNode, EntityType, ImportedEntity, NodeGraph, NodeId};
use super::operations::{PoolOperations, PoolUpdate};
use super::result::IntegrityIssue;

/// State of a node from its own payloads and the final state of its
/// children. A child that has no state yet is an ancestor reached through a
/// cycle and counts as unchanged.
pub fn node_state(graph: &NodeGraph<'_>, node_id: NodeId) -> ChangeState {
    let node = graph.node(node_id);
    let own = match (node.existing_entity(), node.imported_entity()) {
        (None, Some(_)) => ChangeState::New,
        (Some(_), None) => ChangeState::Deleted,
        (Some(_), Some(_)) if node.own_fields_changed() => ChangeState::Updated,
        _ => ChangeState::Unchanged,
    };

    if own != ChangeState::Unchanged {
        return own;
    }

    let child_changed = graph
        .children_of(node_id)
        .any(|(_, child)| child.state().is_some_and(|state| state.propagates()));

    if child_changed {
        ChangeState::ChildChanged
    } else {
        ChangeState::Unchanged
    }
}

/// Assign a state to every built node, children before parents, and collect
/// the integrity issues the builders report
pub fn diff_graph(
    graph: &mut NodeGraph<'_>,
    builders: &HashMap<EntityType, Arc<dyn NodeBuilder>>,
) -> Result<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();
    let order = graph.finish_order().to_vec();

    for node_id in order {
        let state = node_state(graph, node_id);
        graph.node_mut(node_id).set_state(state);

        let entity_type = graph.node(node_id).entity_type();
        let builder = builders
            .get(&entity_type)
            .ok_or(RefreshError::MissingBuilder(entity_type))?;
        issues.extend(builder.check_integrity(graph, node_id));
    }

    for issue in &issues {
        log::warn!("Integrity issue for owner '{}': {}", issue.owner_id, issue);
    }

    Ok(issues)
}

fn unreconciled(node: &EntityNode<'_>, reason: &str) -> RefreshError {
    RefreshError::InvalidNode {
        entity_type: node.entity_type(),
        id: node.entity_id().to_string(),
        reason: reason.to_string(),
    }
}

/// Product name copied onto the pool, from the imported product when there
/// is one and the persisted product otherwise
fn product_name(graph: &NodeGraph<'_>, owner: &str, subscription: &SubscriptionInfo) -> Option<String> {
    let product_id = subscription.product_id()?;
    let node = graph.node(graph.lookup(owner, EntityType::Product, product_id)?);

    node.imported_entity()
        .and_then(|imported| imported.as_product())
        .map(|product| product.name.clone())
        .or_else(|| {
            node.existing_entity()
                .and_then(|existing| existing.as_product())
                .map(|product| product.name.clone())
        })
}

/// The pool a subscription node should be persisted as
fn desired_pool(graph: &NodeGraph<'_>, node: &EntityNode<'_>) -> Result<Pool> {
    let subscription = node
        .imported_entity()
        .and_then(|imported| imported.as_subscription())
        .ok_or_else(|| unreconciled(node, "pool node has no imported subscription"))?;

    let name = product_name(graph, node.owner(), subscription);
    let mut pool = Pool::from_subscription(node.owner(), subscription, name);
    if let Some(existing) = node.existing_entity().and_then(|e| e.as_pool()) {
        pool.pool_type = existing.pool_type;
    }
    Ok(pool)
}

/// Nodes still reachable from an entity that outlives the refresh. Every
/// node that is not being deleted survives, and so does a skipped pool.
fn retained_nodes(graph: &NodeGraph<'_>) -> HashSet<NodeId> {
    let mut stack: Vec<NodeId> = graph
        .iter()
        .filter(|(_, node)| node.skip() || node.state() != Some(ChangeState::Deleted))
        .map(|(node_id, _)| node_id)
        .collect();

    let mut retained = HashSet::new();
    while let Some(node_id) = stack.pop() {
        if retained.insert(node_id) {
            stack.extend(graph.node(node_id).children().iter().copied());
        }
    }
    retained
}

/// Product and content writes: imported versions of new and updated
/// entities are saved, deleted ones are removed once nothing surviving
/// references them
fn collect_dependencies(graph: &NodeGraph<'_>, operations: &mut PoolOperations) -> Result<()> {
    let retained = retained_nodes(graph);

    for (node_id, node) in graph.iter() {
        if node.entity_type() == EntityType::Pool {
            continue;
        }

        let state = node
            .state()
            .ok_or_else(|| unreconciled(node, "node was never reconciled"))?;

        match state {
            ChangeState::New | ChangeState::Updated => match node.imported_entity() {
                Some(ImportedEntity::Product(info)) => operations.save_product(Product::from_info(info)),
                Some(ImportedEntity::Content(info)) => operations.save_content(Content::from_info(info)),
                _ => return Err(unreconciled(node, "changed node has no imported payload")),
            },
            ChangeState::Deleted if !retained.contains(&node_id) => match node.entity_type() {
                EntityType::Product => operations.remove_product(node.entity_id()),
                EntityType::Content => operations.remove_content(node.entity_id()),
                EntityType::Pool => {}
            },
            _ => {}
        }
    }

    Ok(())
}

/// Turn the reconciled graph into pool creations, updates and deletions,
/// plus the product and content writes that go with them
pub fn linearize(graph: &NodeGraph<'_>, owner: &str) -> Result<PoolOperations> {
    let mut operations = PoolOperations::for_owner(owner);

    for (node_id, node) in graph.nodes_of_type(EntityType::Pool) {
        if node.skip() {
            continue;
        }

        let state = node
            .state()
            .ok_or_else(|| unreconciled(node, "pool node was never reconciled"))?;

        match state {
            ChangeState::Unchanged => {}
            ChangeState::New => {
                operations.create(desired_pool(graph, node)?)?;
            }
            ChangeState::Deleted => {
                let existing = node
                    .existing_entity()
                    .and_then(|existing| existing.as_pool())
                    .ok_or_else(|| unreconciled(node, "deleted pool node has no persisted pool"))?;
                operations.delete(existing.clone())?;
            }
            ChangeState::Updated | ChangeState::ChildChanged => {
                let existing = node
                    .existing_entity()
                    .and_then(|existing| existing.as_pool())
                    .ok_or_else(|| unreconciled(node, "updated pool node has no persisted pool"))?;
                let desired = desired_pool(graph, node)?;
                let dependencies_changed = graph
                    .children_of(node_id)
                    .any(|(_, child)| child.state().is_some_and(|s| s.propagates()));

                operations.update(PoolUpdate::new(existing, &desired, dependencies_changed))?;
            }
        }
    }

    collect_dependencies(graph, &mut operations)?;

    log::debug!(
        "Linearized {} creation(s), {} update(s), {} deletion(s), {} dependency save(s), {} dependency removal(s)",
        operations.creations().len(),
        operations.updates().len(),
        operations.deletions().len(),
        operations.dependencies().saved(),
        operations.dependencies().removed()
    );

    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::factory::NodeFactory;
    use crate::refresh::fixtures::{
        OWNER, content_info, existing_pool, mappers_for, product_info, subscription,
    };
    use crate::refresh::mapper::EntityMappers;
    use crate::refresh::model::{Content, PoolField, PoolType, Product, ProductContent};

    fn reconcile(mappers: &EntityMappers) -> (Vec<IntegrityIssue>, PoolOperations, Vec<(EntityType, String, ChangeState)>) {
        let mut factory = NodeFactory::with_standard_builders(mappers);
        factory.build_nodes(OWNER).unwrap();
        let builders = factory.builders().clone();
        let mut graph = factory.into_graph();
        let issues = diff_graph(&mut graph, &builders).unwrap();
        let operations = linearize(&graph, OWNER).unwrap();
        let states = graph
            .iter()
            .map(|(_, node)| {
                (
                    node.entity_type(),
                    node.entity_id().to_string(),
                    node.state().unwrap(),
                )
            })
            .collect();
        (issues, operations, states)
    }

    fn state_of(states: &[(EntityType, String, ChangeState)], entity_type: EntityType, id: &str) -> ChangeState {
        states
            .iter()
            .find(|(t, i, _)| *t == entity_type && i == id)
            .map(|(_, _, s)| *s)
            .unwrap()
    }

    #[test]
    fn test_identical_snapshot_produces_no_operations() {
        let subs = vec![
            subscription("sub-a", product_info("prod-a", &["content-1", "content-2"])),
            subscription("sub-b", product_info("prod-b", &["content-2"])),
        ];
        let mappers = mappers_for(&subs, true);

        let (issues, operations, states) = reconcile(&mappers);

        assert!(issues.is_empty());
        assert!(operations.is_empty());
        assert!(states.iter().all(|(_, _, s)| *s == ChangeState::Unchanged));
    }

    #[test]
    fn test_quantity_change_and_new_subscription() {
        let x = product_info("prod-x", &[]);
        let y = product_info("prod-y", &[]);
        let persisted = subscription("pool-a", x.clone());
        let mut mappers = mappers_for(std::slice::from_ref(&persisted), true);

        let mut a = persisted.clone();
        a.quantity = 15;
        let mut b = subscription("pool-b", y.clone());
        b.quantity = 5;
        mappers.pools.add_imported_entity(a).unwrap();
        mappers.pools.add_imported_entity(b).unwrap();
        mappers.products.add_imported_entity(y).unwrap();

        let (_, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::Updated);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-b"), ChangeState::New);

        let update = operations.update_for("pool-a").unwrap();
        assert_eq!(update.changed_fields.iter().copied().collect::<Vec<_>>(), vec![PoolField::Quantity]);
        assert_eq!(update.quantity(), Some(15));

        assert_eq!(operations.updates().len(), 1);
        assert_eq!(operations.creations().len(), 1);
        assert_eq!(operations.creations()[0].id, "pool-b");
        assert_eq!(operations.creations()[0].quantity, 5);
        assert_eq!(operations.creations()[0].product_name.as_deref(), Some("Product prod-y"));
        assert!(operations.deletions().is_empty());

        let saved: Vec<&str> = operations
            .dependencies()
            .saved_products
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(saved, vec!["prod-y"]);
        assert_eq!(operations.dependencies().removed(), 0);
    }

    #[test]
    fn test_product_attribute_change_marks_pool_child_changed() {
        let sub = subscription("pool-a", product_info("prod-q", &[]));
        let mut mappers = mappers_for(std::slice::from_ref(&sub), true);

        let mut changed = product_info("prod-q", &[]);
        changed.attributes.insert("sockets".to_string(), "4".to_string());
        mappers.products.add_imported_entity(changed).unwrap();

        let (_, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Product, "prod-q"), ChangeState::Updated);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::ChildChanged);

        let update = operations.update_for("pool-a").unwrap();
        assert!(update.changed_fields.is_empty());
        assert!(update.dependencies_changed);
    }

    #[test]
    fn test_product_rename_updates_pool_product_name() {
        let sub = subscription("pool-a", product_info("prod-q", &[]));
        let mut mappers = mappers_for(std::slice::from_ref(&sub), true);

        let mut renamed = product_info("prod-q", &[]);
        renamed.name = "Renamed".to_string();
        mappers.products.add_imported_entity(renamed).unwrap();

        let (_, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::ChildChanged);
        let update = operations.update_for("pool-a").unwrap();
        assert!(update.has_changed(PoolField::ProductName));
        assert_eq!(update.pool.product_name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_new_and_deleted_pools_are_disjoint() {
        let kept = subscription("pool-kept", product_info("prod-a", &[]));
        let dropped = subscription("pool-dropped", product_info("prod-a", &[]));
        let mut mappers = mappers_for(std::slice::from_ref(&kept), true);
        mappers.pools.add_existing_entity(existing_pool(&dropped)).unwrap();
        mappers
            .pools
            .add_imported_entity(subscription("pool-new", product_info("prod-a", &[])))
            .unwrap();

        let (_, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Pool, "pool-dropped"), ChangeState::Deleted);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-new"), ChangeState::New);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-kept"), ChangeState::Unchanged);

        let created: Vec<&str> = operations.creations().iter().map(|p| p.id.as_str()).collect();
        let deleted: Vec<&str> = operations.deletions().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(created, vec!["pool-new"]);
        assert_eq!(deleted, vec!["pool-dropped"]);
        assert!(operations.updates().is_empty());
    }

    #[test]
    fn test_content_dropped_from_product_is_orphaned() {
        let product = product_info("prod-a", &["content-1"]);
        let sub = subscription("pool-a", product.clone());
        let mut mappers = mappers_for(std::slice::from_ref(&sub), true);

        // storage still links content-2; upstream no longer does
        mappers
            .content
            .add_existing_entity(Content::from_info(&content_info("content-2")))
            .unwrap();
        let mut persisted = Product::from_info(&product);
        persisted.product_content.push(ProductContent {
            content_id: "content-2".to_string(),
            enabled: true,
        });
        mappers.products.add_existing_entity(persisted.normalized()).unwrap();

        let (issues, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Content, "content-2"), ChangeState::Deleted);
        assert_eq!(state_of(&states, EntityType::Product, "prod-a"), ChangeState::Updated);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::ChildChanged);
        assert!(issues.is_empty());
        assert!(operations.update_for("pool-a").unwrap().dependencies_changed);

        let dependencies = operations.dependencies();
        assert_eq!(dependencies.saved_products, vec![Product::from_info(&product)]);
        assert_eq!(dependencies.removed_content, vec!["content-2"]);
    }

    #[test]
    fn test_deleted_product_under_surviving_pool_is_an_issue() {
        let sub = subscription("pool-a", product_info("prod-a", &[]));
        let mut mappers = EntityMappers::new();
        mappers.pools.add_existing_entity(existing_pool(&sub)).unwrap();
        mappers.pools.add_imported_entity(sub.clone()).unwrap();
        mappers
            .products
            .add_existing_entity(Product::from_info(&product_info("prod-a", &[])))
            .unwrap();

        let (issues, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Product, "prod-a"), ChangeState::Deleted);
        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::ChildChanged);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].parent_id, "pool-a");
        assert_eq!(issues[0].child_id, "prod-a");
        assert_eq!(operations.updates().len(), 1);
        assert!(operations.dependencies().removed_products.is_empty());
    }

    #[test]
    fn test_product_dropped_upstream_is_removed_with_its_content() {
        let old = product_info("prod-old", &["content-old", "content-shared"]);
        let persisted = subscription("pool-a", old);
        let mut mappers = EntityMappers::new();
        mappers.pools.add_existing_entity(existing_pool(&persisted)).unwrap();
        for id in ["content-old", "content-shared"] {
            mappers
                .content
                .add_existing_entity(Content::from_info(&content_info(id)))
                .unwrap();
        }
        mappers
            .products
            .add_existing_entity(Product::from_info(&product_info("prod-old", &["content-old", "content-shared"])))
            .unwrap();

        let new = product_info("prod-new", &["content-shared"]);
        mappers.content.add_imported_entity(content_info("content-shared")).unwrap();
        mappers.products.add_imported_entity(new.clone()).unwrap();
        mappers
            .pools
            .add_imported_entity(subscription("pool-a", new))
            .unwrap();

        let (issues, operations, states) = reconcile(&mappers);

        assert!(issues.is_empty());
        assert_eq!(state_of(&states, EntityType::Product, "prod-old"), ChangeState::Deleted);
        assert_eq!(state_of(&states, EntityType::Content, "content-shared"), ChangeState::Unchanged);

        let update = operations.update_for("pool-a").unwrap();
        assert!(update.has_changed(PoolField::ProductId));

        let dependencies = operations.dependencies();
        assert_eq!(dependencies.removed_products, vec!["prod-old"]);
        assert_eq!(dependencies.removed_content, vec!["content-old"]);
        let saved: Vec<&str> = dependencies.saved_products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(saved, vec!["prod-new"]);
    }

    #[test]
    fn test_deleted_parent_is_not_upgraded() {
        let sub = subscription("pool-a", product_info("prod-a", &[]));
        let mut mappers = EntityMappers::new();
        mappers.pools.add_existing_entity(existing_pool(&sub)).unwrap();
        mappers
            .products
            .add_existing_entity(Product::from_info(&product_info("prod-a", &[])))
            .unwrap();

        let (issues, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::Deleted);
        assert!(issues.is_empty());
        assert_eq!(operations.deletions().len(), 1);
    }

    #[test]
    fn test_skipped_pool_produces_no_operation() {
        let sub = subscription("pool-a", product_info("prod-a", &[]));
        let mut mappers = mappers_for(&[], false);
        mappers
            .products
            .add_existing_entity(Product::from_info(&product_info("prod-a", &[])))
            .unwrap();
        mappers
            .products
            .add_imported_entity(product_info("prod-a", &[]))
            .unwrap();
        let mut derived = existing_pool(&sub);
        derived.pool_type = PoolType::EntitlementDerived;
        mappers.pools.add_existing_entity(derived).unwrap();

        let (_, operations, states) = reconcile(&mappers);

        assert_eq!(state_of(&states, EntityType::Pool, "pool-a"), ChangeState::Deleted);
        assert!(operations.is_empty());
    }
}
