//! Single-key mutation steps and their inverses.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use rsent_storage::{ChildrenReference, EntityNode, ParentReference, ReferenceStore};

use crate::error::{DomainError, DomainResult};

/// One reversible step of a graph mutation.
///
/// `execute` touches exactly one storage key. `undo` is the inverse and is
/// expected to tolerate the state `execute` left behind, whatever that was.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short human-readable description, used in unwind logs.
    fn describe(&self) -> String;

    async fn execute(&self) -> DomainResult<()>;

    async fn undo(&self) -> DomainResult<()>;
}

/// Creates a group's entity record; fails when the group already exists.
pub struct CreateGroupNodeOperation<S: ?Sized> {
    store: Arc<S>,
    node: EntityNode,
}

impl<S: ReferenceStore + ?Sized> CreateGroupNodeOperation<S> {
    pub fn new(store: Arc<S>, node: EntityNode) -> Self {
        Self { store, node }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for CreateGroupNodeOperation<S> {
    fn describe(&self) -> String {
        format!("create group node {}", self.node.node_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        if !self.store.put_entity_if_absent(&self.node).await? {
            return Err(DomainError::AlreadyExists {
                node_id: self.node.node_id.clone(),
            });
        }
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .delete_entity(&self.node.data_partition_id, &self.node.node_id)
            .await?;
        Ok(())
    }
}

/// Materializes a user node the first time the user is added to any group.
/// A user that already exists is left untouched, and undo only deletes what
/// this step created.
pub struct CreateMemberNodeOperation<S: ?Sized> {
    store: Arc<S>,
    node: EntityNode,
    created: AtomicBool,
}

impl<S: ReferenceStore + ?Sized> CreateMemberNodeOperation<S> {
    pub fn new(store: Arc<S>, node: EntityNode) -> Self {
        Self {
            store,
            node,
            created: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for CreateMemberNodeOperation<S> {
    fn describe(&self) -> String {
        format!("create member node {}", self.node.node_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        let created = self.store.put_entity_if_absent(&self.node).await?;
        self.created.store(created, Ordering::SeqCst);
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        if self.created.load(Ordering::SeqCst) {
            self.store
                .delete_entity(&self.node.data_partition_id, &self.node.node_id)
                .await?;
        }
        Ok(())
    }
}

/// Deletes a group's entity record together with its own reference sets.
/// Carries a snapshot taken before the mutation so undo can restore all of
/// it. Ordered last in a delete sequence: it is the only step whose undo
/// needs the snapshot to still be accurate.
pub struct DeleteGroupNodeOperation<S: ?Sized> {
    store: Arc<S>,
    node: EntityNode,
    parents: HashSet<ParentReference>,
    children: HashSet<ChildrenReference>,
}

impl<S: ReferenceStore + ?Sized> DeleteGroupNodeOperation<S> {
    pub fn new(
        store: Arc<S>,
        node: EntityNode,
        parents: HashSet<ParentReference>,
        children: HashSet<ChildrenReference>,
    ) -> Self {
        Self {
            store,
            node,
            parents,
            children,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for DeleteGroupNodeOperation<S> {
    fn describe(&self) -> String {
        format!("delete group node {}", self.node.node_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .delete_entity(&self.node.data_partition_id, &self.node.node_id)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store.put_entity_if_absent(&self.node).await?;
        for parent in &self.parents {
            self.store
                .add_parent_ref(&self.node.data_partition_id, &self.node.node_id, parent)
                .await?;
        }
        for child in &self.children {
            self.store
                .add_child_ref(&self.node.data_partition_id, &self.node.node_id, child)
                .await?;
        }
        Ok(())
    }
}

/// Adds one direction of a membership edge to the child's parent index;
/// fails when the edge is already present.
pub struct AddParentRefOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    child_id: String,
    parent: ParentReference,
}

impl<S: ReferenceStore + ?Sized> AddParentRefOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, child_id: &str, parent: ParentReference) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            child_id: child_id.to_string(),
            parent,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for AddParentRefOperation<S> {
    fn describe(&self) -> String {
        format!("add parent ref {} -> {}", self.child_id, self.parent.id)
    }

    async fn execute(&self) -> DomainResult<()> {
        if !self
            .store
            .add_parent_ref(&self.partition_id, &self.child_id, &self.parent)
            .await?
        {
            return Err(DomainError::AlreadyMember {
                member_id: self.child_id.clone(),
                group_id: self.parent.id.clone(),
            });
        }
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .remove_parent_ref(&self.partition_id, &self.child_id, &self.parent)
            .await?;
        Ok(())
    }
}

/// Removes one direction of a membership edge from the child's parent index.
pub struct RemoveParentRefOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    child_id: String,
    parent: ParentReference,
}

impl<S: ReferenceStore + ?Sized> RemoveParentRefOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, child_id: &str, parent: ParentReference) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            child_id: child_id.to_string(),
            parent,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for RemoveParentRefOperation<S> {
    fn describe(&self) -> String {
        format!("remove parent ref {} -> {}", self.child_id, self.parent.id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .remove_parent_ref(&self.partition_id, &self.child_id, &self.parent)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .add_parent_ref(&self.partition_id, &self.child_id, &self.parent)
            .await?;
        Ok(())
    }
}

/// Adds the mirror direction of a membership edge to the parent's child
/// index; fails when the edge is already present.
pub struct AddChildRefOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    parent_id: String,
    child: ChildrenReference,
}

impl<S: ReferenceStore + ?Sized> AddChildRefOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, parent_id: &str, child: ChildrenReference) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            parent_id: parent_id.to_string(),
            child,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for AddChildRefOperation<S> {
    fn describe(&self) -> String {
        format!("add child ref {} -> {}", self.parent_id, self.child.id)
    }

    async fn execute(&self) -> DomainResult<()> {
        if !self
            .store
            .add_child_ref(&self.partition_id, &self.parent_id, &self.child)
            .await?
        {
            return Err(DomainError::AlreadyMember {
                member_id: self.child.id.clone(),
                group_id: self.parent_id.clone(),
            });
        }
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .remove_child_ref(&self.partition_id, &self.parent_id, &self.child)
            .await?;
        Ok(())
    }
}

/// Removes the mirror direction of a membership edge.
pub struct RemoveChildRefOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    parent_id: String,
    child: ChildrenReference,
}

impl<S: ReferenceStore + ?Sized> RemoveChildRefOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, parent_id: &str, child: ChildrenReference) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            parent_id: parent_id.to_string(),
            child,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for RemoveChildRefOperation<S> {
    fn describe(&self) -> String {
        format!("remove child ref {} -> {}", self.parent_id, self.child.id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .remove_child_ref(&self.partition_id, &self.parent_id, &self.child)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .add_child_ref(&self.partition_id, &self.parent_id, &self.child)
            .await?;
        Ok(())
    }
}

/// Indexes a group under one app id.
pub struct AddAppIdAssociationOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    app_id: String,
    group_id: String,
}

impl<S: ReferenceStore + ?Sized> AddAppIdAssociationOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, app_id: &str, group_id: &str) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            app_id: app_id.to_string(),
            group_id: group_id.to_string(),
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for AddAppIdAssociationOperation<S> {
    fn describe(&self) -> String {
        format!("add app id {} for group {}", self.app_id, self.group_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .add_app_id_association(&self.partition_id, &self.app_id, &self.group_id)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .remove_app_id_association(&self.partition_id, &self.app_id, &self.group_id)
            .await?;
        Ok(())
    }
}

/// Removes a group from one app id's index.
pub struct RemoveAppIdAssociationOperation<S: ?Sized> {
    store: Arc<S>,
    partition_id: String,
    app_id: String,
    group_id: String,
}

impl<S: ReferenceStore + ?Sized> RemoveAppIdAssociationOperation<S> {
    pub fn new(store: Arc<S>, partition_id: &str, app_id: &str, group_id: &str) -> Self {
        Self {
            store,
            partition_id: partition_id.to_string(),
            app_id: app_id.to_string(),
            group_id: group_id.to_string(),
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for RemoveAppIdAssociationOperation<S> {
    fn describe(&self) -> String {
        format!("remove app id {} for group {}", self.app_id, self.group_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .remove_app_id_association(&self.partition_id, &self.app_id, &self.group_id)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .add_app_id_association(&self.partition_id, &self.app_id, &self.group_id)
            .await?;
        Ok(())
    }
}

/// Rewrites a group's entity record with new app ids, keeping the previous
/// record for undo.
pub struct UpdateNodeAppIdsOperation<S: ?Sized> {
    store: Arc<S>,
    previous: EntityNode,
    updated: EntityNode,
}

impl<S: ReferenceStore + ?Sized> UpdateNodeAppIdsOperation<S> {
    pub fn new(store: Arc<S>, previous: EntityNode, updated: EntityNode) -> Self {
        Self {
            store,
            previous,
            updated,
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for UpdateNodeAppIdsOperation<S> {
    fn describe(&self) -> String {
        format!("update app ids of {}", self.updated.node_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store.update_entity(&self.updated).await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store.update_entity(&self.previous).await?;
        Ok(())
    }
}

/// Records a user's association with a partition in the central index;
/// fails when the user's partition quota is exhausted.
pub struct AddUserPartitionAssociationOperation<S: ?Sized> {
    store: Arc<S>,
    user_id: String,
    partition_id: String,
}

impl<S: ReferenceStore + ?Sized> AddUserPartitionAssociationOperation<S> {
    pub fn new(store: Arc<S>, user_id: &str, partition_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
            partition_id: partition_id.to_string(),
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for AddUserPartitionAssociationOperation<S> {
    fn describe(&self) -> String {
        format!("associate user {} with partition {}", self.user_id, self.partition_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        if !self
            .store
            .add_user_partition_association(&self.user_id, &self.partition_id)
            .await?
        {
            return Err(DomainError::PartitionQuotaExceeded {
                user_id: self.user_id.clone(),
            });
        }
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .remove_user_partition_association(&self.user_id, &self.partition_id)
            .await?;
        Ok(())
    }
}

/// Removes a user's association with a partition from the central index.
pub struct RemoveUserPartitionAssociationOperation<S: ?Sized> {
    store: Arc<S>,
    user_id: String,
    partition_id: String,
}

impl<S: ReferenceStore + ?Sized> RemoveUserPartitionAssociationOperation<S> {
    pub fn new(store: Arc<S>, user_id: &str, partition_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
            partition_id: partition_id.to_string(),
        }
    }
}

#[async_trait]
impl<S: ReferenceStore + ?Sized> Operation for RemoveUserPartitionAssociationOperation<S> {
    fn describe(&self) -> String {
        format!("dissociate user {} from partition {}", self.user_id, self.partition_id)
    }

    async fn execute(&self) -> DomainResult<()> {
        self.store
            .remove_user_partition_association(&self.user_id, &self.partition_id)
            .await?;
        Ok(())
    }

    async fn undo(&self) -> DomainResult<()> {
        self.store
            .add_user_partition_association(&self.user_id, &self.partition_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rsent_storage::{MemoryReferenceStore, Role};

    fn group(name: &str) -> EntityNode {
        EntityNode::new_group(name, "p1", "p1.contoso.com")
    }

    #[tokio::test]
    async fn create_group_execute_then_undo_leaves_no_trace() {
        let store = MemoryReferenceStore::new_shared();
        let op = CreateGroupNodeOperation::new(Arc::clone(&store), group("users.ops"));

        op.execute().await.unwrap();
        assert!(matches!(op.execute().await, Err(DomainError::AlreadyExists { .. })));

        op.undo().await.unwrap();
        assert!(store
            .get_entity("p1", "users.ops@p1.contoso.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_member_undo_keeps_preexisting_users() {
        let store = MemoryReferenceStore::new_shared();
        let alice = EntityNode::new_user("alice@corp.example.com", "p1");
        store.put_entity_if_absent(&alice).await.unwrap();

        let op = CreateMemberNodeOperation::new(Arc::clone(&store), alice.clone());
        op.execute().await.unwrap();
        op.undo().await.unwrap();

        assert!(store.get_entity("p1", &alice.node_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_group_undo_restores_node_and_reference_sets() {
        let store = MemoryReferenceStore::new_shared();
        let data_x = group("data.x.viewers");
        let alice = EntityNode::new_user("alice@corp.example.com", "p1");
        let parent = ParentReference::for_group(&group("users.data.root"));
        let child = ChildrenReference::for_member(&alice, Role::Owner);

        store.put_entity_if_absent(&data_x).await.unwrap();
        store.add_parent_ref("p1", &data_x.node_id, &parent).await.unwrap();
        store.add_child_ref("p1", &data_x.node_id, &child).await.unwrap();

        let op = DeleteGroupNodeOperation::new(
            Arc::clone(&store),
            data_x.clone(),
            HashSet::from([parent.clone()]),
            HashSet::from([child.clone()]),
        );
        op.execute().await.unwrap();
        assert!(store.get_entity("p1", &data_x.node_id).await.unwrap().is_none());

        op.undo().await.unwrap();
        assert!(store.get_entity("p1", &data_x.node_id).await.unwrap().is_some());
        assert_eq!(
            store
                .direct_parents_of("p1", &[data_x.node_id.clone()])
                .await
                .unwrap(),
            vec![parent]
        );
        assert!(store.has_direct_child("p1", &data_x.node_id, &child).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_edge_is_a_conflict() {
        let store = MemoryReferenceStore::new_shared();
        let parent = ParentReference::for_group(&group("users.ops"));
        let op = AddParentRefOperation::new(Arc::clone(&store), "p1", "alice", parent);

        op.execute().await.unwrap();
        assert!(matches!(op.execute().await, Err(DomainError::AlreadyMember { .. })));
    }

    #[tokio::test]
    async fn association_quota_maps_to_partition_quota_error() {
        let store = Arc::new(MemoryReferenceStore::new().with_association_limit(1));
        AddUserPartitionAssociationOperation::new(Arc::clone(&store), "alice", "p1")
            .execute()
            .await
            .unwrap();

        let op = AddUserPartitionAssociationOperation::new(Arc::clone(&store), "alice", "p2");
        assert!(matches!(
            op.execute().await,
            Err(DomainError::PartitionQuotaExceeded { .. })
        ));
    }
}
