//! Group membership use cases.
//!
//! `GroupService` is the inbound surface of the domain: it validates input,
//! checks policy, decomposes each mutation into an operation sequence and
//! hands the sequence to the runner. Reads go straight to the resolver or
//! the store.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::instrument;

use rsent_storage::{
    ChildrenReference, EntityNode, GroupType, GroupsPage, ParentReference, ParentTree,
    ReferenceStore, Role, MAX_PARENTS, USERS_DATA_ROOT_GROUP,
};

use crate::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, LogAuditSink};
use crate::error::{DomainError, DomainResult};
use crate::operations::{
    AddAppIdAssociationOperation, AddChildRefOperation, AddParentRefOperation,
    AddUserPartitionAssociationOperation, CreateGroupNodeOperation, CreateMemberNodeOperation,
    DeleteGroupNodeOperation, Operation, OperationRunner, RemoveAppIdAssociationOperation,
    RemoveChildRefOperation, RemoveParentRefOperation, RemoveUserPartitionAssociationOperation,
    UpdateNodeAppIdsOperation,
};
use crate::resolver::{ClosureResolver, ResolverConfig};
use crate::validation::{
    validate_email, validate_group_in_partition, validate_group_name,
    validate_list_group_partitions, validate_single_partition, ProtectedMembersConfig,
    ServiceAccountsConfig,
};

/// Service-level configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base DNS domain; a partition's group emails live under
    /// `<partition>.<domain>`.
    pub domain: String,
    /// Maximum number of groups any identity may belong to.
    pub max_parents: usize,
    /// Maximum number of data groups parented under a partition's data root.
    pub data_root_quota: usize,
}

impl ServiceConfig {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            max_parents: MAX_PARENTS,
            data_root_quota: MAX_PARENTS,
        }
    }

    pub fn with_max_parents(mut self, max_parents: usize) -> Self {
        self.max_parents = max_parents;
        self
    }

    pub fn with_data_root_quota(mut self, quota: usize) -> Self {
        self.data_root_quota = quota;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CreateGroupRequest {
    pub requester_id: String,
    pub partition_id: String,
    pub name: String,
    pub description: String,
    pub app_ids: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct AddMemberRequest {
    pub requester_id: String,
    pub partition_id: String,
    pub group_email: String,
    pub member_email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct RemoveMemberRequest {
    pub requester_id: String,
    pub partition_id: String,
    pub group_email: String,
    pub member_email: String,
}

/// The group membership use-case surface.
pub struct GroupService<S: ReferenceStore + ?Sized> {
    store: Arc<S>,
    resolver: ClosureResolver<S>,
    runner: OperationRunner,
    protected: ProtectedMembersConfig,
    service_accounts: ServiceAccountsConfig,
    audit: Arc<dyn AuditSink>,
    config: ServiceConfig,
}

impl<S: ReferenceStore + ?Sized> GroupService<S> {
    pub fn new(store: Arc<S>, config: ServiceConfig, service_accounts: ServiceAccountsConfig) -> Self {
        let resolver = ClosureResolver::with_config(
            Arc::clone(&store),
            ResolverConfig::new().with_max_parents(config.max_parents),
        );
        Self {
            store,
            resolver,
            runner: OperationRunner::new(),
            protected: ProtectedMembersConfig::default(),
            service_accounts,
            audit: Arc::new(LogAuditSink),
            config,
        }
    }

    pub fn with_protected_members(mut self, protected: ProtectedMembersConfig) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_runner(mut self, runner: OperationRunner) -> Self {
        self.runner = runner;
        self
    }

    fn partition_domain(&self, partition_id: &str) -> String {
        format!("{partition_id}.{}", self.config.domain)
    }

    /// Runs a mutation sequence and publishes exactly one audit event for it,
    /// success or failure.
    async fn run_audited(
        &self,
        operations: Vec<Box<dyn Operation>>,
        actor: &str,
        partition_id: &str,
        action: AuditAction,
        resources: Vec<String>,
    ) -> DomainResult<()> {
        let result = self.runner.run(operations).await;
        self.audit.publish(AuditEvent {
            timestamp: chrono::Utc::now(),
            actor: actor.to_string(),
            data_partition_id: partition_id.to_string(),
            action,
            resources,
            outcome: if result.is_ok() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
        });
        result
    }

    /// Creates a group. The requester becomes its OWNER, the group is indexed
    /// under its app ids, and a non-bootstrap data group is additionally
    /// parented under the partition's data root.
    #[instrument(skip(self, request), fields(partition = %request.partition_id, group = %request.name))]
    pub async fn create_group(&self, request: CreateGroupRequest) -> DomainResult<EntityNode> {
        validate_single_partition(&request.partition_id)?;
        validate_group_name(&request.name)?;
        validate_email(&request.requester_id)?;

        let domain = self.partition_domain(&request.partition_id);
        let mut group = EntityNode::new_group(&request.name, &request.partition_id, &domain);
        group.description = request.description.clone();
        group.app_ids = request.app_ids.clone();

        if self
            .store
            .get_entity(&request.partition_id, &group.node_id)
            .await?
            .is_some()
        {
            return Err(DomainError::AlreadyExists {
                node_id: group.node_id,
            });
        }

        let requester = EntityNode::for_requester(&request.requester_id, &request.partition_id);
        let requester_groups = self.resolver.load_all_parents(&requester).await?;
        if requester_groups.parent_references.len() >= self.config.max_parents {
            return Err(DomainError::ParentQuotaExceeded {
                node_id: requester.node_id,
                limit: self.config.max_parents,
            });
        }

        let mut operations: Vec<Box<dyn Operation>> = vec![
            Box::new(CreateGroupNodeOperation::new(
                Arc::clone(&self.store),
                group.clone(),
            )),
            Box::new(AddParentRefOperation::new(
                Arc::clone(&self.store),
                &requester.data_partition_id,
                &requester.node_id,
                ParentReference::for_group_with_role(&group, Role::Owner),
            )),
            Box::new(AddChildRefOperation::new(
                Arc::clone(&self.store),
                &group.data_partition_id,
                &group.node_id,
                ChildrenReference::for_member(&requester, Role::Owner),
            )),
        ];
        for app_id in group.effective_app_ids() {
            operations.push(Box::new(AddAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                &request.partition_id,
                &app_id,
                &group.node_id,
            )));
        }

        if group.is_data_group() && !self.service_accounts.is_bootstrap_group(&group.name) {
            let data_root_id = format!("{USERS_DATA_ROOT_GROUP}@{domain}");
            if let Some(data_root) = self
                .store
                .get_entity(&request.partition_id, &data_root_id)
                .await?
            {
                let data_root_memberships = self
                    .store
                    .direct_parents_of(
                        &request.partition_id,
                        std::slice::from_ref(&data_root.node_id),
                    )
                    .await?;
                if data_root_memberships.len() >= self.config.data_root_quota {
                    return Err(DomainError::ParentQuotaExceeded {
                        node_id: data_root.node_id,
                        limit: self.config.data_root_quota,
                    });
                }
                operations.push(Box::new(AddParentRefOperation::new(
                    Arc::clone(&self.store),
                    &data_root.data_partition_id,
                    &data_root.node_id,
                    ParentReference::for_group_with_role(&group, Role::Member),
                )));
                operations.push(Box::new(AddChildRefOperation::new(
                    Arc::clone(&self.store),
                    &group.data_partition_id,
                    &group.node_id,
                    ChildrenReference::for_member(&data_root, Role::Member),
                )));
            }
        }

        self.run_audited(
            operations,
            &request.requester_id,
            &request.partition_id,
            AuditAction::CreateGroup,
            vec![group.node_id.clone()],
        )
        .await?;
        Ok(group)
    }

    /// Deletes a group and every mirror reference relatives hold to it.
    /// Deleting an absent group succeeds; bootstrap groups are not deletable.
    #[instrument(skip(self), fields(partition = %partition_id, group = %group_email))]
    pub async fn delete_group(
        &self,
        requester_id: &str,
        partition_id: &str,
        group_email: &str,
    ) -> DomainResult<()> {
        validate_single_partition(partition_id)?;
        let domain = self.partition_domain(partition_id);
        validate_group_in_partition(group_email, partition_id, &domain)?;

        let group_email = group_email.to_lowercase();
        let node = match self.store.get_entity(partition_id, &group_email).await? {
            Some(node) => node,
            None => return Ok(()),
        };
        if self.service_accounts.is_bootstrap_group(&node.name) {
            return Err(DomainError::Validation {
                message: format!("bootstrap group {} cannot be deleted", node.name),
            });
        }

        let parents: HashSet<ParentReference> = self
            .store
            .direct_parents_of(partition_id, std::slice::from_ref(&node.node_id))
            .await?
            .into_iter()
            .collect();
        let children: HashSet<ChildrenReference> = self
            .store
            .direct_children_of(partition_id, std::slice::from_ref(&node.node_id))
            .await?
            .into_iter()
            .collect();

        let mut operations: Vec<Box<dyn Operation>> = Vec::new();
        // Mirror entries first, the snapshot-bearing node delete last.
        for parent in &parents {
            operations.push(Box::new(RemoveChildRefOperation::new(
                Arc::clone(&self.store),
                &parent.data_partition_id,
                &parent.id,
                ChildrenReference {
                    id: node.node_id.clone(),
                    data_partition_id: node.data_partition_id.clone(),
                    node_type: node.node_type,
                    role: parent.role.unwrap_or(Role::Member),
                },
            )));
        }
        for child in &children {
            operations.push(Box::new(RemoveParentRefOperation::new(
                Arc::clone(&self.store),
                &child.data_partition_id,
                &child.id,
                ParentReference::for_group_with_role(&node, child.role),
            )));
        }
        for app_id in node.effective_app_ids() {
            operations.push(Box::new(RemoveAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                partition_id,
                &app_id,
                &node.node_id,
            )));
        }
        operations.push(Box::new(DeleteGroupNodeOperation::new(
            Arc::clone(&self.store),
            node.clone(),
            parents,
            children,
        )));

        self.run_audited(
            operations,
            requester_id,
            partition_id,
            AuditAction::DeleteGroup,
            vec![node.node_id],
        )
        .await
    }

    /// Adds a member (user or group) to a group.
    ///
    /// Preconditions checked before any write: the group exists, the edge is
    /// not already present in either role, the member stays under the parent
    /// quota, and a group member would not close a membership cycle.
    #[instrument(skip(self, request), fields(partition = %request.partition_id, group = %request.group_email, member = %request.member_email))]
    pub async fn add_member(&self, request: AddMemberRequest) -> DomainResult<()> {
        validate_single_partition(&request.partition_id)?;
        let domain = self.partition_domain(&request.partition_id);
        validate_group_in_partition(&request.group_email, &request.partition_id, &domain)?;
        validate_email(&request.member_email)?;

        let group_email = request.group_email.to_lowercase();
        let group = self
            .store
            .get_entity(&request.partition_id, &group_email)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound {
                group_id: group_email.clone(),
            })?;

        let candidate =
            EntityNode::member_node_from_email(&request.member_email, &request.partition_id, &domain);
        let existing = self
            .store
            .get_entity(&candidate.data_partition_id, &candidate.node_id)
            .await?;
        let (member, lazily_created) = match existing {
            Some(node) => (node, false),
            None if candidate.is_group() => {
                return Err(DomainError::GroupNotFound {
                    group_id: candidate.node_id,
                });
            }
            // Users are materialized on first membership.
            None => (candidate, true),
        };

        if member.is_group() && request.role == Role::Owner {
            return Err(DomainError::Validation {
                message: format!("group {} cannot be an owner of another group", member.node_id),
            });
        }

        for role in [Role::Owner, Role::Member] {
            if self
                .store
                .has_direct_child(
                    &group.data_partition_id,
                    &group.node_id,
                    &ChildrenReference::for_member(&member, role),
                )
                .await?
            {
                return Err(DomainError::AlreadyMember {
                    member_id: member.node_id,
                    group_id: group.node_id,
                });
            }
        }

        let member_groups = self.resolver.load_all_parents(&member).await?;
        let in_partition = member_groups
            .parent_references
            .iter()
            .filter(|r| r.data_partition_id == request.partition_id)
            .count();
        if in_partition >= self.config.max_parents {
            return Err(DomainError::ParentQuotaExceeded {
                node_id: member.node_id,
                limit: self.config.max_parents,
            });
        }

        if member.is_group() {
            if member.unique_identifier() == group.unique_identifier() {
                return Err(DomainError::CyclicMembership {
                    member_id: member.node_id,
                    group_id: group.node_id,
                });
            }
            let group_ancestors = self.resolver.load_all_parents(&group).await?;
            let closes_cycle = group_ancestors.parent_references.iter().any(|r| {
                r.id == member.node_id && r.data_partition_id == member.data_partition_id
            });
            if closes_cycle {
                return Err(DomainError::CyclicMembership {
                    member_id: member.node_id,
                    group_id: group.node_id,
                });
            }
        }

        let mut operations: Vec<Box<dyn Operation>> = Vec::new();
        if lazily_created {
            operations.push(Box::new(CreateMemberNodeOperation::new(
                Arc::clone(&self.store),
                member.clone(),
            )));
        }
        operations.push(Box::new(AddParentRefOperation::new(
            Arc::clone(&self.store),
            &member.data_partition_id,
            &member.node_id,
            ParentReference::for_group_with_role(&group, request.role),
        )));
        operations.push(Box::new(AddChildRefOperation::new(
            Arc::clone(&self.store),
            &group.data_partition_id,
            &group.node_id,
            ChildrenReference::for_member(&member, request.role),
        )));
        // Membership in the root users group is the partition entry point.
        if group.is_root_users_group() && member.is_user() {
            operations.push(Box::new(AddUserPartitionAssociationOperation::new(
                Arc::clone(&self.store),
                &member.node_id,
                &request.partition_id,
            )));
        }

        self.run_audited(
            operations,
            &request.requester_id,
            &request.partition_id,
            AuditAction::AddMember,
            vec![group.node_id.clone(), member.node_id.clone()],
        )
        .await
    }

    /// Removes a member from a group, refusing protected removals. Returns
    /// the ids of users whose effective entitlements change.
    #[instrument(skip(self, request), fields(partition = %request.partition_id, group = %request.group_email, member = %request.member_email))]
    pub async fn remove_member(&self, request: RemoveMemberRequest) -> DomainResult<Vec<String>> {
        validate_single_partition(&request.partition_id)?;
        let domain = self.partition_domain(&request.partition_id);
        validate_group_in_partition(&request.group_email, &request.partition_id, &domain)?;
        validate_email(&request.member_email)?;

        let group_email = request.group_email.to_lowercase();
        let group = self
            .store
            .get_entity(&request.partition_id, &group_email)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound {
                group_id: group_email.clone(),
            })?;

        let candidate =
            EntityNode::member_node_from_email(&request.member_email, &request.partition_id, &domain);
        let member = self
            .store
            .get_entity(&candidate.data_partition_id, &candidate.node_id)
            .await?
            .unwrap_or(candidate);

        let mut member_role = None;
        for role in [Role::Owner, Role::Member] {
            if self
                .store
                .has_direct_child(
                    &group.data_partition_id,
                    &group.node_id,
                    &ChildrenReference::for_member(&member, role),
                )
                .await?
            {
                member_role = Some(role);
                break;
            }
        }
        let role = member_role.ok_or_else(|| DomainError::MemberNotFound {
            member_id: member.node_id.clone(),
            group_id: group.node_id.clone(),
        })?;

        if self.service_accounts.is_member_protected(&group, &member)
            || (group.is_data_group() && member.is_users_data_root_group())
            || self.protected.is_member_protected(&group, &member)
        {
            return Err(DomainError::ProtectedMember {
                member_id: member.node_id,
                group_id: group.node_id,
            });
        }

        // Computed before the edges go away.
        let impacted = self
            .resolver
            .load_all_children_users(&member)
            .await?
            .children_user_ids;

        let mut operations: Vec<Box<dyn Operation>> = vec![
            Box::new(RemoveParentRefOperation::new(
                Arc::clone(&self.store),
                &member.data_partition_id,
                &member.node_id,
                ParentReference::for_group_with_role(&group, role),
            )),
            Box::new(RemoveChildRefOperation::new(
                Arc::clone(&self.store),
                &group.data_partition_id,
                &group.node_id,
                ChildrenReference::for_member(&member, role),
            )),
        ];
        if group.is_root_users_group() && member.is_user() {
            operations.push(Box::new(RemoveUserPartitionAssociationOperation::new(
                Arc::clone(&self.store),
                &member.node_id,
                &request.partition_id,
            )));
        }

        self.run_audited(
            operations,
            &request.requester_id,
            &request.partition_id,
            AuditAction::RemoveMember,
            vec![group.node_id.clone(), member.node_id.clone()],
        )
        .await?;
        Ok(impacted)
    }

    /// Replaces a group's app ids, touching only the index keys in the
    /// symmetric difference.
    #[instrument(skip(self, app_ids), fields(partition = %partition_id, group = %group_email))]
    pub async fn update_app_ids(
        &self,
        requester_id: &str,
        partition_id: &str,
        group_email: &str,
        app_ids: HashSet<String>,
    ) -> DomainResult<EntityNode> {
        validate_single_partition(partition_id)?;
        let domain = self.partition_domain(partition_id);
        validate_group_in_partition(group_email, partition_id, &domain)?;

        let group_email = group_email.to_lowercase();
        let node = self
            .store
            .get_entity(partition_id, &group_email)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound {
                group_id: group_email.clone(),
            })?;

        let mut updated = node.clone();
        updated.app_ids = app_ids;
        let previous_keys = node.effective_app_ids();
        let next_keys = updated.effective_app_ids();

        let mut operations: Vec<Box<dyn Operation>> = Vec::new();
        for app_id in previous_keys.difference(&next_keys) {
            operations.push(Box::new(RemoveAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                partition_id,
                app_id,
                &node.node_id,
            )));
        }
        for app_id in next_keys.difference(&previous_keys) {
            operations.push(Box::new(AddAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                partition_id,
                app_id,
                &node.node_id,
            )));
        }
        operations.push(Box::new(UpdateNodeAppIdsOperation::new(
            Arc::clone(&self.store),
            node,
            updated.clone(),
        )));

        self.run_audited(
            operations,
            requester_id,
            partition_id,
            AuditAction::UpdateAppIds,
            vec![updated.node_id.clone()],
        )
        .await?;
        Ok(updated)
    }

    /// Renames a group, rewriting its entity record and every reference that
    /// carries the old id: the mirror entries relatives hold, the group's own
    /// reference sets and its app-id index entries. Data groups and bootstrap
    /// groups keep their names.
    #[instrument(skip(self), fields(partition = %partition_id, group = %group_email, new_name = %new_name))]
    pub async fn rename_group(
        &self,
        requester_id: &str,
        partition_id: &str,
        group_email: &str,
        new_name: &str,
    ) -> DomainResult<EntityNode> {
        validate_single_partition(partition_id)?;
        let domain = self.partition_domain(partition_id);
        validate_group_in_partition(group_email, partition_id, &domain)?;
        let new_name = new_name.to_lowercase();
        validate_group_name(&new_name)?;

        let group_email = group_email.to_lowercase();
        let node = self
            .store
            .get_entity(partition_id, &group_email)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound {
                group_id: group_email.clone(),
            })?;

        if node.is_data_group() {
            return Err(DomainError::Validation {
                message: format!("data group {} cannot be renamed", node.node_id),
            });
        }
        if self.service_accounts.is_bootstrap_group(&node.name) {
            return Err(DomainError::Validation {
                message: format!("bootstrap group {} cannot be renamed", node.name),
            });
        }
        if self.service_accounts.is_bootstrap_group(&new_name) {
            return Err(DomainError::Validation {
                message: format!("{new_name} is a reserved bootstrap group name"),
            });
        }

        let mut renamed = EntityNode::new_group(&new_name, partition_id, &domain);
        renamed.description = node.description.clone();
        renamed.app_ids = node.app_ids.clone();
        if self
            .store
            .get_entity(partition_id, &renamed.node_id)
            .await?
            .is_some()
        {
            return Err(DomainError::AlreadyExists {
                node_id: renamed.node_id,
            });
        }

        let parents: HashSet<ParentReference> = self
            .store
            .direct_parents_of(partition_id, std::slice::from_ref(&node.node_id))
            .await?
            .into_iter()
            .collect();
        let children: HashSet<ChildrenReference> = self
            .store
            .direct_children_of(partition_id, std::slice::from_ref(&node.node_id))
            .await?
            .into_iter()
            .collect();

        let mut operations: Vec<Box<dyn Operation>> = vec![Box::new(
            CreateGroupNodeOperation::new(Arc::clone(&self.store), renamed.clone()),
        )];
        // Re-key the group's own reference sets under the new id.
        for parent in &parents {
            operations.push(Box::new(AddParentRefOperation::new(
                Arc::clone(&self.store),
                &renamed.data_partition_id,
                &renamed.node_id,
                parent.clone(),
            )));
        }
        for child in &children {
            operations.push(Box::new(AddChildRefOperation::new(
                Arc::clone(&self.store),
                &renamed.data_partition_id,
                &renamed.node_id,
                child.clone(),
            )));
        }
        // Swap the mirror entries relatives hold, old id out, new id in.
        for parent in &parents {
            let role = parent.role.unwrap_or(Role::Member);
            operations.push(Box::new(RemoveChildRefOperation::new(
                Arc::clone(&self.store),
                &parent.data_partition_id,
                &parent.id,
                ChildrenReference::for_member(&node, role),
            )));
            operations.push(Box::new(AddChildRefOperation::new(
                Arc::clone(&self.store),
                &parent.data_partition_id,
                &parent.id,
                ChildrenReference::for_member(&renamed, role),
            )));
        }
        for child in &children {
            operations.push(Box::new(RemoveParentRefOperation::new(
                Arc::clone(&self.store),
                &child.data_partition_id,
                &child.id,
                ParentReference::for_group_with_role(&node, child.role),
            )));
            operations.push(Box::new(AddParentRefOperation::new(
                Arc::clone(&self.store),
                &child.data_partition_id,
                &child.id,
                ParentReference::for_group_with_role(&renamed, child.role),
            )));
        }
        for app_id in node.effective_app_ids() {
            operations.push(Box::new(RemoveAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                partition_id,
                &app_id,
                &node.node_id,
            )));
            operations.push(Box::new(AddAppIdAssociationOperation::new(
                Arc::clone(&self.store),
                partition_id,
                &app_id,
                &renamed.node_id,
            )));
        }
        operations.push(Box::new(DeleteGroupNodeOperation::new(
            Arc::clone(&self.store),
            node.clone(),
            parents,
            children,
        )));

        self.run_audited(
            operations,
            requester_id,
            partition_id,
            AuditAction::RenameGroup,
            vec![node.node_id.clone(), renamed.node_id.clone()],
        )
        .await?;
        Ok(renamed)
    }

    /// All groups the member belongs to in one partition. With
    /// `owners_only`, keeps only groups the member owns directly.
    #[instrument(skip(self), fields(partition = %partition_id, member = %member_id))]
    pub async fn get_parents(
        &self,
        member_id: &str,
        partition_id: &str,
        owners_only: bool,
    ) -> DomainResult<ParentTree> {
        validate_single_partition(partition_id)?;
        let domain = self.partition_domain(partition_id);
        let member = EntityNode::member_node_from_email(member_id, partition_id, &domain);
        let mut tree = self.resolver.load_all_parents(&member).await?;
        if owners_only {
            tree.parent_references
                .retain(|r| r.role == Some(Role::Owner));
        }
        Ok(tree)
    }

    /// Membership listing across partitions, applying the shared-tenancy
    /// rule on the partition list.
    #[instrument(skip(self), fields(member = %member_id))]
    pub async fn get_groups(
        &self,
        member_id: &str,
        partition_ids: &[String],
    ) -> DomainResult<HashSet<ParentReference>> {
        validate_list_group_partitions(partition_ids)?;
        let mut all = HashSet::new();
        for partition_id in partition_ids {
            let domain = self.partition_domain(partition_id);
            let member = EntityNode::member_node_from_email(member_id, partition_id, &domain);
            let tree = self.resolver.load_all_parents(&member).await?;
            all.extend(tree.parent_references);
        }
        Ok(all)
    }

    /// Paged listing of a partition's groups.
    pub async fn get_groups_in_partition(
        &self,
        partition_id: &str,
        group_type: Option<GroupType>,
        cursor: Option<&str>,
        limit: usize,
    ) -> DomainResult<GroupsPage> {
        validate_single_partition(partition_id)?;
        Ok(self
            .store
            .get_groups_in_partition(partition_id, group_type, cursor, limit)
            .await?)
    }
}
