//! In-memory reference store.
//!
//! The reference backend implementation, used for tests and single-process
//! deployments. Each logical index is a `DashMap`; mutations go through the
//! atomic entry API so every single-key write either fully lands or leaves the
//! key untouched, which is the commit discipline the operation engine relies
//! on.
//!
//! # Performance characteristics
//!
//! - Entity and reference writes: O(1) average (DashMap + HashSet)
//! - `direct_parents_of` / `direct_children_of`: O(sum of ref-set sizes)
//! - `get_groups_in_partition`: O(N) scan over the partition's entities

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::model::{
    ChildrenReference, EntityNode, GroupType, GroupsPage, NodeType, ParentReference,
};
use crate::traits::{parse_offset_cursor, ReferenceStore};

/// In-memory implementation of [`ReferenceStore`].
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    /// Entity records keyed by `node_id-partition`.
    entities: DashMap<String, EntityNode>,
    /// Parent references keyed by the child's scoped id.
    parent_refs: DashMap<String, HashSet<ParentReference>>,
    /// Child references keyed by the parent's scoped id.
    child_refs: DashMap<String, HashSet<ChildrenReference>>,
    /// App-id index keyed by `partition/app_id`, holding group ids.
    app_id_groups: DashMap<String, HashSet<String>>,
    /// Central user -> partitions association index (process-wide).
    user_partitions: DashMap<String, HashSet<String>>,
    /// Maximum partitions a user may be associated with, if bounded.
    association_limit: Option<usize>,
}

fn scoped(partition_id: &str, node_id: &str) -> String {
    format!("{node_id}-{partition_id}")
}

fn app_key(partition_id: &str, app_id: &str) -> String {
    format!("{partition_id}/{app_id}")
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Bounds the number of partitions any single user may join.
    pub fn with_association_limit(mut self, limit: usize) -> Self {
        self.association_limit = Some(limit);
        self
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn get_entity(
        &self,
        partition_id: &str,
        node_id: &str,
    ) -> StorageResult<Option<EntityNode>> {
        Ok(self
            .entities
            .get(&scoped(partition_id, node_id))
            .map(|e| e.value().clone()))
    }

    async fn put_entity_if_absent(&self, node: &EntityNode) -> StorageResult<bool> {
        use dashmap::mapref::entry::Entry;
        match self
            .entities
            .entry(scoped(&node.data_partition_id, &node.node_id))
        {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(node.clone());
                Ok(true)
            }
        }
    }

    async fn update_entity(&self, node: &EntityNode) -> StorageResult<()> {
        let key = scoped(&node.data_partition_id, &node.node_id);
        let mut entry = self
            .entities
            .get_mut(&key)
            .ok_or_else(|| StorageError::NodeNotFound {
                node_id: node.node_id.clone(),
            })?;
        *entry = node.clone();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_entity(&self, partition_id: &str, node_id: &str) -> StorageResult<()> {
        let key = scoped(partition_id, node_id);
        self.entities.remove(&key);
        self.parent_refs.remove(&key);
        self.child_refs.remove(&key);
        Ok(())
    }

    async fn add_parent_ref(
        &self,
        partition_id: &str,
        child_id: &str,
        parent: &ParentReference,
    ) -> StorageResult<bool> {
        let mut refs = self
            .parent_refs
            .entry(scoped(partition_id, child_id))
            .or_default();
        Ok(refs.insert(parent.clone()))
    }

    async fn remove_parent_ref(
        &self,
        partition_id: &str,
        child_id: &str,
        parent: &ParentReference,
    ) -> StorageResult<()> {
        if let Some(mut refs) = self.parent_refs.get_mut(&scoped(partition_id, child_id)) {
            refs.remove(parent);
        }
        Ok(())
    }

    async fn add_child_ref(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<bool> {
        let mut refs = self
            .child_refs
            .entry(scoped(partition_id, parent_id))
            .or_default();
        Ok(refs.insert(child.clone()))
    }

    async fn remove_child_ref(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<()> {
        if let Some(mut refs) = self.child_refs.get_mut(&scoped(partition_id, parent_id)) {
            refs.remove(child);
        }
        Ok(())
    }

    async fn has_direct_child(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<bool> {
        Ok(self
            .child_refs
            .get(&scoped(partition_id, parent_id))
            .map(|refs| refs.contains(child))
            .unwrap_or(false))
    }

    async fn direct_parents_of(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> StorageResult<Vec<ParentReference>> {
        let mut union: HashSet<ParentReference> = HashSet::new();
        for node_id in node_ids {
            if let Some(refs) = self.parent_refs.get(&scoped(partition_id, node_id)) {
                union.extend(refs.iter().cloned());
            }
        }
        Ok(union.into_iter().collect())
    }

    async fn direct_children_of(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> StorageResult<Vec<ChildrenReference>> {
        let mut union: HashSet<ChildrenReference> = HashSet::new();
        for node_id in node_ids {
            if let Some(refs) = self.child_refs.get(&scoped(partition_id, node_id)) {
                union.extend(refs.iter().cloned());
            }
        }
        Ok(union.into_iter().collect())
    }

    async fn add_app_id_association(
        &self,
        partition_id: &str,
        app_id: &str,
        group_id: &str,
    ) -> StorageResult<()> {
        self.app_id_groups
            .entry(app_key(partition_id, app_id))
            .or_default()
            .insert(group_id.to_string());
        Ok(())
    }

    async fn remove_app_id_association(
        &self,
        partition_id: &str,
        app_id: &str,
        group_id: &str,
    ) -> StorageResult<()> {
        if let Some(mut groups) = self.app_id_groups.get_mut(&app_key(partition_id, app_id)) {
            groups.remove(group_id);
        }
        Ok(())
    }

    async fn groups_for_app_id(
        &self,
        partition_id: &str,
        app_id: &str,
    ) -> StorageResult<HashSet<String>> {
        Ok(self
            .app_id_groups
            .get(&app_key(partition_id, app_id))
            .map(|groups| groups.clone())
            .unwrap_or_default())
    }

    async fn add_user_partition_association(
        &self,
        user_id: &str,
        partition_id: &str,
    ) -> StorageResult<bool> {
        let mut partitions = self.user_partitions.entry(user_id.to_string()).or_default();
        if partitions.contains(partition_id) {
            return Ok(true);
        }
        if let Some(limit) = self.association_limit {
            if partitions.len() >= limit {
                return Ok(false);
            }
        }
        partitions.insert(partition_id.to_string());
        Ok(true)
    }

    async fn remove_user_partition_association(
        &self,
        user_id: &str,
        partition_id: &str,
    ) -> StorageResult<()> {
        if let Some(mut partitions) = self.user_partitions.get_mut(user_id) {
            partitions.remove(partition_id);
        }
        Ok(())
    }

    async fn user_partition_associations(&self, user_id: &str) -> StorageResult<HashSet<String>> {
        Ok(self
            .user_partitions
            .get(user_id)
            .map(|partitions| partitions.clone())
            .unwrap_or_default())
    }

    async fn get_entity_nodes(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> StorageResult<Vec<EntityNode>> {
        let mut nodes = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(node) = self.entities.get(&scoped(partition_id, node_id)) {
                nodes.push(node.value().clone());
            }
        }
        Ok(nodes)
    }

    async fn get_group_owners(
        &self,
        partition_id: &str,
        group_id: &str,
    ) -> StorageResult<HashSet<String>> {
        Ok(self
            .child_refs
            .get(&scoped(partition_id, group_id))
            .map(|refs| {
                refs.iter()
                    .filter(|r| r.is_owner())
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn association_count(
        &self,
        user_ids: &[String],
    ) -> StorageResult<HashMap<String, usize>> {
        let mut counts = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            let count = self
                .user_partitions
                .get(user_id)
                .map(|partitions| partitions.len())
                .unwrap_or(0);
            counts.insert(user_id.clone(), count);
        }
        Ok(counts)
    }

    async fn get_groups_in_partition(
        &self,
        partition_id: &str,
        group_type: Option<GroupType>,
        cursor: Option<&str>,
        limit: usize,
    ) -> StorageResult<GroupsPage> {
        let offset = parse_offset_cursor(cursor)?;

        let mut groups: Vec<EntityNode> = self
            .entities
            .iter()
            .filter(|entry| {
                let node = entry.value();
                node.data_partition_id == partition_id
                    && node.node_type == NodeType::Group
                    && group_type.map_or(true, |gt| node.group_type() == gt)
            })
            .map(|entry| entry.value().clone())
            .collect();

        // Sort by node id for a stable cursor order.
        groups.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let total_count = groups.len();
        let page: Vec<EntityNode> = groups.into_iter().skip(offset).take(limit).collect();
        let next_offset = offset + page.len();
        let next_cursor = if next_offset < total_count {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(GroupsPage {
            groups: page,
            next_cursor,
            total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn group(name: &str, partition: &str) -> EntityNode {
        EntityNode::new_group(name, partition, &format!("{partition}.contoso.com"))
    }

    #[tokio::test]
    async fn put_entity_if_absent_reports_duplicates() {
        let store = MemoryReferenceStore::new();
        let node = group("data.x", "p1");
        assert!(store.put_entity_if_absent(&node).await.unwrap());
        assert!(!store.put_entity_if_absent(&node).await.unwrap());
    }

    #[tokio::test]
    async fn same_node_id_is_distinct_across_partitions() {
        let store = MemoryReferenceStore::new();
        let user_p1 = EntityNode::new_user("alice@corp.example.com", "p1");
        let user_p2 = EntityNode::new_user("alice@corp.example.com", "p2");
        assert!(store.put_entity_if_absent(&user_p1).await.unwrap());
        assert!(store.put_entity_if_absent(&user_p2).await.unwrap());
        assert!(store.get_entity("p1", &user_p1.node_id).await.unwrap().is_some());
        assert!(store.get_entity("p2", &user_p2.node_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_parent_ref_returns_false() {
        let store = MemoryReferenceStore::new();
        let parent = ParentReference::for_group(&group("data.x", "p1"));
        assert!(store.add_parent_ref("p1", "alice", &parent).await.unwrap());
        assert!(!store.add_parent_ref("p1", "alice", &parent).await.unwrap());
        assert_eq!(store.direct_parents_of("p1", &["alice".to_string()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_entity_drops_own_reference_sets() {
        let store = MemoryReferenceStore::new();
        let data_x = group("data.x", "p1");
        store.put_entity_if_absent(&data_x).await.unwrap();
        store
            .add_parent_ref("p1", &data_x.node_id, &ParentReference::for_group(&group("users.data.root", "p1")))
            .await
            .unwrap();
        store
            .add_child_ref(
                "p1",
                &data_x.node_id,
                &ChildrenReference::for_member(&EntityNode::new_user("alice", "p1"), Role::Member),
            )
            .await
            .unwrap();

        store.delete_entity("p1", &data_x.node_id).await.unwrap();

        assert!(store.get_entity("p1", &data_x.node_id).await.unwrap().is_none());
        assert!(store
            .direct_parents_of("p1", &[data_x.node_id.clone()])
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .direct_children_of("p1", &[data_x.node_id.clone()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn association_limit_is_enforced() {
        let store = MemoryReferenceStore::new().with_association_limit(2);
        assert!(store.add_user_partition_association("alice", "p1").await.unwrap());
        assert!(store.add_user_partition_association("alice", "p2").await.unwrap());
        // Re-adding an existing association never counts against the quota.
        assert!(store.add_user_partition_association("alice", "p1").await.unwrap());
        assert!(!store.add_user_partition_association("alice", "p3").await.unwrap());

        store.remove_user_partition_association("alice", "p1").await.unwrap();
        assert!(store.add_user_partition_association("alice", "p3").await.unwrap());
    }

    #[tokio::test]
    async fn groups_page_cursor_walks_the_partition() {
        let store = MemoryReferenceStore::new();
        for name in ["data.a", "data.b", "data.c", "users.ops"] {
            store.put_entity_if_absent(&group(name, "p1")).await.unwrap();
        }
        store.put_entity_if_absent(&group("data.other", "p2")).await.unwrap();

        let first = store
            .get_groups_in_partition("p1", Some(GroupType::Data), None, 2)
            .await
            .unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.groups.len(), 2);
        let cursor = first.next_cursor.expect("expected another page");

        let second = store
            .get_groups_in_partition("p1", Some(GroupType::Data), Some(&cursor), 2)
            .await
            .unwrap();
        assert_eq!(second.groups.len(), 1);
        assert!(second.next_cursor.is_none());

        let err = store
            .get_groups_in_partition("p1", None, Some("bogus"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursor { .. }));
    }
}
