//! ReferenceStore trait definition.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::model::{
    ChildrenReference, EntityNode, GroupType, GroupsPage, ParentReference, ParentTree,
};

/// Abstract storage contract over the four denormalized membership indexes
/// (entity record, parent-index, child-index, app-id index) plus the central
/// user/partition association index.
///
/// Every operation is scoped by `partition_id` except the association index,
/// which is process-wide. Implementations must be thread-safe and must make
/// each single-key write land fully or not at all; a discarded optimistic
/// write is reported as [`StorageError::ConcurrentModification`], never
/// swallowed.
#[async_trait]
pub trait ReferenceStore: Send + Sync + 'static {
    // Entity index

    async fn get_entity(&self, partition_id: &str, node_id: &str)
        -> StorageResult<Option<EntityNode>>;

    /// Writes the node only if no node with its id exists in the partition.
    /// Returns `false` when the node was already present.
    async fn put_entity_if_absent(&self, node: &EntityNode) -> StorageResult<bool>;

    /// Rewrites the node's metadata record (used for app-id updates).
    async fn update_entity(&self, node: &EntityNode) -> StorageResult<()>;

    /// Removes the entity record together with the node's own parent-ref and
    /// child-ref sets. Mirror entries held by relatives are not touched; the
    /// operation engine removes those separately.
    async fn delete_entity(&self, partition_id: &str, node_id: &str) -> StorageResult<()>;

    // Parent / child reference indexes

    /// Returns `false` when the reference was already present.
    async fn add_parent_ref(
        &self,
        partition_id: &str,
        child_id: &str,
        parent: &ParentReference,
    ) -> StorageResult<bool>;

    async fn remove_parent_ref(
        &self,
        partition_id: &str,
        child_id: &str,
        parent: &ParentReference,
    ) -> StorageResult<()>;

    /// Returns `false` when the reference was already present.
    async fn add_child_ref(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<bool>;

    async fn remove_child_ref(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<()>;

    /// Membership probe on the child index.
    async fn has_direct_child(
        &self,
        partition_id: &str,
        parent_id: &str,
        child: &ChildrenReference,
    ) -> StorageResult<bool>;

    /// Union of the parent references of the given nodes, read from the
    /// queried partition's index. Returned references may point into other
    /// partitions.
    async fn direct_parents_of(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> StorageResult<Vec<ParentReference>>;

    /// Union of the child references of the given nodes.
    async fn direct_children_of(
        &self,
        partition_id: &str,
        node_ids: &[String],
    ) -> StorageResult<Vec<ChildrenReference>>;

    /// Whole ancestor closure in one query, for backends that can answer it
    /// natively (a relational backend with a recursive CTE). Backends that
    /// cannot return `None` and the resolver walks frontiers instead. The two
    /// formulations must produce the same reference set.
    async fn parent_closure(&self, _member: &EntityNode) -> StorageResult<Option<ParentTree>> {
        Ok(None)
    }

    // App-id index

    async fn add_app_id_association(
        &self,
        partition_id: &str,
        app_id: &str,
        group_id: &str,
    ) -> StorageResult<()>;

    async fn remove_app_id_association(
        &self,
        partition_id: &str,
        app_id: &str,
        group_id: &str,
    ) -> StorageResult<()>;

    async fn groups_for_app_id(
        &self,
        partition_id: &str,
        app_id: &str,
    ) -> StorageResult<HashSet<String>>;

    // Central user/partition association index

    /// Associates a user with a partition. Returns `false` when the user's
    /// partition quota is exhausted.
    async fn add_user_partition_association(
        &self,
        user_id: &str,
        partition_id: &str,
    ) -> StorageResult<bool>;

    async fn remove_user_partition_association(
        &self,
        user_id: &str,
        partition_id: &str,
    ) -> StorageResult<()>;

    async fn user_partition_associations(&self, user_id: &str) -> StorageResult<HashSet<String>>;

    // Backend-optional capabilities. Backends without a cheap way to answer
    // these return the empty default.

    async fn get_entity_nodes(
        &self,
        _partition_id: &str,
        _node_ids: &[String],
    ) -> StorageResult<Vec<EntityNode>> {
        Ok(Vec::new())
    }

    async fn get_group_owners(
        &self,
        _partition_id: &str,
        _group_id: &str,
    ) -> StorageResult<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn association_count(
        &self,
        _user_ids: &[String],
    ) -> StorageResult<HashMap<String, usize>> {
        Ok(HashMap::new())
    }

    // Listing

    /// Pages through the partition's groups, optionally filtered by derived
    /// group type. The cursor is opaque to callers.
    async fn get_groups_in_partition(
        &self,
        partition_id: &str,
        group_type: Option<GroupType>,
        cursor: Option<&str>,
        limit: usize,
    ) -> StorageResult<GroupsPage>;
}

/// Decodes an opaque cursor into the integer offset both backends use.
pub fn parse_offset_cursor(cursor: Option<&str>) -> StorageResult<usize> {
    match cursor {
        None => Ok(0),
        Some(raw) if raw.is_empty() => Ok(0),
        Some(raw) => raw.parse::<usize>().map_err(|_| StorageError::InvalidCursor {
            cursor: raw.to_string(),
        }),
    }
}
