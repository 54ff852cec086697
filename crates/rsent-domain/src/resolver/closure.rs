//! Frontier-walk closure resolution over the reference store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::instrument;

use rsent_storage::{ChildrenTree, EntityNode, ParentReference, ParentTree, ReferenceStore};

use crate::error::{DomainError, DomainResult};
use crate::resolver::config::ResolverConfig;

/// Resolves the transitive membership closure of a node.
///
/// When the backend answers whole closures natively the resolver uses that
/// answer directly; otherwise it expands frontiers level by level, batching
/// the reads of one level into one store call per partition and running
/// those calls in parallel. A visited set keyed by node id and partition
/// makes the walk terminate even on a graph that holds a cycle.
pub struct ClosureResolver<S: ReferenceStore + ?Sized> {
    store: Arc<S>,
    config: ResolverConfig,
}

impl<S: ReferenceStore + ?Sized> ClosureResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// All groups the member belongs to, directly or transitively.
    ///
    /// References into other partitions are kept only for groups that may be
    /// referenced cross-partition. The traversal is abandoned with
    /// [`DomainError::ParentQuotaExceeded`] once it accumulates more
    /// references than the configured maximum.
    #[instrument(skip(self, member), fields(member_id = %member.node_id))]
    pub async fn load_all_parents(&self, member: &EntityNode) -> DomainResult<ParentTree> {
        if let Some(tree) = self.store.parent_closure(member).await? {
            return self.filter_and_bound(member, tree);
        }

        let mut visited: HashSet<String> = HashSet::from([member.unique_identifier()]);
        let mut all: HashSet<ParentReference> = HashSet::new();
        let mut max_depth = 0usize;

        let mut frontier = self
            .store
            .direct_parents_of(&member.data_partition_id, std::slice::from_ref(&member.node_id))
            .await?;

        while !frontier.is_empty() {
            // One id list per partition; already-visited references are
            // dropped here, which is what terminates a cyclic graph.
            let mut by_partition: HashMap<String, Vec<String>> = HashMap::new();
            for reference in frontier.drain(..) {
                let key = format!("{}-{}", reference.id, reference.data_partition_id);
                if visited.insert(key) {
                    by_partition
                        .entry(reference.data_partition_id.clone())
                        .or_default()
                        .push(reference.id.clone());
                    all.insert(reference);
                }
            }
            if by_partition.is_empty() {
                break;
            }
            max_depth += 1;

            if all.len() > self.config.max_parents {
                return Err(DomainError::ParentQuotaExceeded {
                    node_id: member.node_id.clone(),
                    limit: self.config.max_parents,
                });
            }

            let mut pending: FuturesUnordered<_> = by_partition
                .into_iter()
                .map(|(partition, ids)| {
                    let store = Arc::clone(&self.store);
                    async move { store.direct_parents_of(&partition, &ids).await }
                })
                .collect();
            while let Some(batch) = pending.next().await {
                frontier.extend(batch?);
            }
        }

        self.filter_and_bound(
            member,
            ParentTree {
                parent_references: all,
                max_depth,
            },
        )
    }

    /// All users reachable from the node through nested groups. A user node
    /// resolves to itself.
    #[instrument(skip(self, node), fields(node_id = %node.node_id))]
    pub async fn load_all_children_users(&self, node: &EntityNode) -> DomainResult<ChildrenTree> {
        if node.is_user() {
            return Ok(ChildrenTree {
                children_user_ids: vec![node.node_id.clone()],
                max_depth: 1,
            });
        }

        let mut visited: HashSet<String> = HashSet::from([node.unique_identifier()]);
        let mut users: Vec<String> = Vec::new();
        let mut max_depth = 0usize;

        let mut frontier = self
            .store
            .direct_children_of(&node.data_partition_id, std::slice::from_ref(&node.node_id))
            .await?;

        while !frontier.is_empty() {
            let mut by_partition: HashMap<String, Vec<String>> = HashMap::new();
            for reference in frontier.drain(..) {
                let key = format!("{}-{}", reference.id, reference.data_partition_id);
                if !visited.insert(key) {
                    continue;
                }
                if reference.is_user() {
                    users.push(reference.id.clone());
                } else {
                    // Only group children get expanded further.
                    by_partition
                        .entry(reference.data_partition_id.clone())
                        .or_default()
                        .push(reference.id.clone());
                }
            }
            max_depth += 1;
            if by_partition.is_empty() {
                break;
            }

            let mut pending: FuturesUnordered<_> = by_partition
                .into_iter()
                .map(|(partition, ids)| {
                    let store = Arc::clone(&self.store);
                    async move { store.direct_children_of(&partition, &ids).await }
                })
                .collect();
            while let Some(batch) = pending.next().await {
                frontier.extend(batch?);
            }
        }

        Ok(ChildrenTree {
            children_user_ids: users,
            max_depth,
        })
    }

    /// Drops cross-partition references to groups that may not be referenced
    /// across partitions, then enforces the parent quota on what remains.
    fn filter_and_bound(&self, member: &EntityNode, tree: ParentTree) -> DomainResult<ParentTree> {
        let parent_references: HashSet<ParentReference> = tree
            .parent_references
            .into_iter()
            .filter(|r| {
                r.data_partition_id == member.data_partition_id || r.cross_partition_allowed()
            })
            .collect();

        if parent_references.len() > self.config.max_parents {
            return Err(DomainError::ParentQuotaExceeded {
                node_id: member.node_id.clone(),
                limit: self.config.max_parents,
            });
        }

        Ok(ParentTree {
            parent_references,
            max_depth: tree.max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rsent_storage::{ChildrenReference, MemoryReferenceStore, Role};

    const DOMAIN: &str = "p1.contoso.com";

    fn group(name: &str) -> EntityNode {
        EntityNode::new_group(name, "p1", DOMAIN)
    }

    fn user(id: &str) -> EntityNode {
        EntityNode::new_user(id, "p1")
    }

    async fn link(store: &MemoryReferenceStore, child: &EntityNode, parent: &EntityNode) {
        store
            .add_parent_ref(
                &child.data_partition_id,
                &child.node_id,
                &ParentReference::for_group(parent),
            )
            .await
            .unwrap();
        store
            .add_child_ref(
                &parent.data_partition_id,
                &parent.node_id,
                &ChildrenReference::for_member(child, Role::Member),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn diamond_graph_resolves_each_ancestor_once() {
        let store = MemoryReferenceStore::new_shared();
        let alice = user("alice@corp.example.com");
        let left = group("users.left");
        let right = group("users.right");
        let top = group("users.top");
        link(&store, &alice, &left).await;
        link(&store, &alice, &right).await;
        link(&store, &left, &top).await;
        link(&store, &right, &top).await;

        let resolver = ClosureResolver::new(Arc::clone(&store));
        let tree = resolver.load_all_parents(&alice).await.unwrap();

        assert_eq!(tree.parent_references.len(), 3);
        assert_eq!(tree.max_depth, 2);
        assert!(tree.ids().contains(top.node_id.as_str()));
    }

    #[tokio::test]
    async fn cyclic_graph_still_terminates() {
        let store = MemoryReferenceStore::new_shared();
        let alice = user("alice@corp.example.com");
        let a = group("users.a");
        let b = group("users.b");
        link(&store, &alice, &a).await;
        link(&store, &a, &b).await;
        // Damaged graph: b is also a member of a.
        link(&store, &b, &a).await;

        let resolver = ClosureResolver::new(Arc::clone(&store));
        let tree = resolver.load_all_parents(&alice).await.unwrap();
        assert_eq!(tree.parent_references.len(), 2);
    }

    #[tokio::test]
    async fn cross_partition_references_are_filtered() {
        let store = MemoryReferenceStore::new_shared();
        let alice = user("alice@corp.example.com");
        let local = group("users.local");
        let foreign_data = EntityNode::new_group("data.shared.viewers", "p2", "p2.contoso.com");
        let foreign_users = EntityNode::new_group("users.foreign", "p2", "p2.contoso.com");
        link(&store, &alice, &local).await;
        link(&store, &alice, &foreign_data).await;
        link(&store, &alice, &foreign_users).await;

        let resolver = ClosureResolver::new(Arc::clone(&store));
        let tree = resolver.load_all_parents(&alice).await.unwrap();

        let ids = tree.ids();
        assert!(ids.contains(local.node_id.as_str()));
        assert!(ids.contains(foreign_data.node_id.as_str()));
        assert!(!ids.contains(foreign_users.node_id.as_str()));
    }

    #[tokio::test]
    async fn traversal_is_abandoned_past_the_parent_quota() {
        let store = MemoryReferenceStore::new_shared();
        let alice = user("alice@corp.example.com");
        for i in 0..5 {
            link(&store, &alice, &group(&format!("users.g{i}"))).await;
        }

        let resolver =
            ClosureResolver::with_config(Arc::clone(&store), ResolverConfig::new().with_max_parents(3));
        let err = resolver.load_all_parents(&alice).await.unwrap_err();
        assert!(matches!(err, DomainError::ParentQuotaExceeded { limit: 3, .. }));
    }

    #[tokio::test]
    async fn children_walk_collects_users_and_expands_groups() {
        let store = MemoryReferenceStore::new_shared();
        let top = group("users.top");
        let nested = group("users.nested");
        let alice = user("alice@corp.example.com");
        let bob = user("bob@corp.example.com");
        link(&store, &alice, &top).await;
        link(&store, &nested, &top).await;
        link(&store, &bob, &nested).await;

        let resolver = ClosureResolver::new(Arc::clone(&store));
        let tree = resolver.load_all_children_users(&top).await.unwrap();

        let mut users = tree.children_user_ids.clone();
        users.sort();
        assert_eq!(users, vec![alice.node_id.clone(), bob.node_id.clone()]);
        assert_eq!(tree.max_depth, 2);
    }

    #[tokio::test]
    async fn user_node_resolves_to_itself() {
        let store = MemoryReferenceStore::new_shared();
        let alice = user("alice@corp.example.com");
        let resolver = ClosureResolver::new(Arc::clone(&store));

        let tree = resolver.load_all_children_users(&alice).await.unwrap();
        assert_eq!(tree.children_user_ids, vec![alice.node_id.clone()]);
    }

    mod closure_properties {
        use super::*;
        use proptest::prelude::*;

        // Edges only point from lower to higher group index, so generated
        // graphs are acyclic and naive reachability is well defined.
        fn dag_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
            prop::collection::vec((0usize..8, 0usize..8), 0..24).prop_map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|(a, b)| a < b)
                    .collect::<Vec<_>>()
            })
        }

        proptest! {
            #[test]
            fn walk_matches_naive_reachability(
                edges in dag_edges(),
                memberships in prop::collection::vec(0usize..8, 1..6),
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let store = MemoryReferenceStore::new_shared();
                    let groups: Vec<EntityNode> =
                        (0..8).map(|i| group(&format!("users.g{i}"))).collect();
                    let alice = user("alice@corp.example.com");

                    for m in &memberships {
                        link(&store, &alice, &groups[*m]).await;
                    }
                    for (a, b) in &edges {
                        link(&store, &groups[*a], &groups[*b]).await;
                    }

                    // Naive fixed-point reachability over the edge list.
                    let mut reachable: HashSet<usize> = memberships.iter().copied().collect();
                    loop {
                        let before = reachable.len();
                        for (a, b) in &edges {
                            if reachable.contains(a) {
                                reachable.insert(*b);
                            }
                        }
                        if reachable.len() == before {
                            break;
                        }
                    }

                    let resolver = ClosureResolver::new(Arc::clone(&store));
                    let tree = resolver.load_all_parents(&alice).await.unwrap();
                    let expected: HashSet<&str> =
                        reachable.iter().map(|i| groups[*i].node_id.as_str()).collect();
                    assert_eq!(tree.ids(), expected);
                });
            }
        }
    }
}
