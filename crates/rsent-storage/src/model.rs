//! Graph record types stored by the reference store.
//!
//! The membership graph is denormalized into four logical indexes
//! (entity-by-id, parent-refs-of-child, child-refs-of-parent, app-id index)
//! plus a central user/partition association index. The types in this module
//! are the records those indexes hold.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Maximum number of ancestor groups an identity may belong to.
///
/// Also bounds the frontier traversal of the closure resolver; exceeding it
/// is a precondition failure, not an error in the graph itself.
pub const MAX_PARENTS: usize = 5000;

/// Name of the per-partition root users group.
pub const ROOT_USERS_GROUP: &str = "users";

/// Name of the per-partition data-root group that parents all data groups.
pub const USERS_DATA_ROOT_GROUP: &str = "users.data.root";

/// Sentinel key under which groups with no explicit app ids are indexed.
pub const DEFAULT_APP_ID_KEY: &str = "no-app-id";

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    User,
    Group,
}

/// Role of a member inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Member,
    Owner,
}

/// Derived classification of a group by naming convention. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupType {
    Data,
    User,
    Service,
    Other,
}

/// A user or a group node.
///
/// `node_id` is a lowercase email-shaped identifier, unique per partition.
/// For groups it is derived as `name@<partition domain>`; for users it is the
/// user's identity as provided, lowercased. The partition of a node is
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_partition_id: String,
    #[serde(default)]
    pub app_ids: HashSet<String>,
}

impl EntityNode {
    /// Builds a group node from its name and partition domain
    /// (e.g. `new_group("data.x.viewers", "opendes", "opendes.contoso.com")`).
    pub fn new_group(name: &str, partition_id: &str, partition_domain: &str) -> Self {
        let name = name.to_lowercase();
        Self {
            node_id: format!("{name}@{partition_domain}"),
            node_type: NodeType::Group,
            name,
            description: String::new(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Parses a group node out of a group email. The partition id is the
    /// first label of the email domain (`data.x@opendes.contoso.com` ->
    /// partition `opendes`).
    pub fn from_group_email(email: &str) -> Self {
        let email = email.to_lowercase();
        let (name, domain) = email.split_once('@').unwrap_or((email.as_str(), ""));
        let partition_id = domain.split('.').next().unwrap_or_default().to_string();
        Self {
            node_id: email.clone(),
            node_type: NodeType::Group,
            name: name.to_string(),
            description: String::new(),
            data_partition_id: partition_id,
            app_ids: HashSet::new(),
        }
    }

    /// Builds a user node, lazily materialized the first time the user is
    /// added to any group in the partition.
    pub fn new_user(member_id: &str, partition_id: &str) -> Self {
        let id = member_id.to_lowercase();
        Self {
            node_id: id.clone(),
            node_type: NodeType::User,
            name: id,
            description: member_id.to_string(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Builds the ephemeral node representing the requester of an operation.
    pub fn for_requester(requester_id: &str, partition_id: &str) -> Self {
        let id = requester_id.to_lowercase();
        Self {
            node_id: id.clone(),
            node_type: NodeType::User,
            name: id,
            description: String::new(),
            data_partition_id: partition_id.to_string(),
            app_ids: HashSet::new(),
        }
    }

    /// Decides whether an email names a group or a user. The remove-member
    /// interface only carries the member's email, so the partition domain
    /// suffix is the only way to tell the two apart.
    pub fn member_node_from_email(email: &str, partition_id: &str, partition_domain: &str) -> Self {
        if email.ends_with(&format!("@{partition_domain}")) {
            Self::from_group_email(email)
        } else {
            Self::new_user(email, partition_id)
        }
    }

    /// Key uniquely identifying this node across partitions.
    pub fn unique_identifier(&self) -> String {
        format!("{}-{}", self.node_id, self.data_partition_id)
    }

    pub fn is_group(&self) -> bool {
        self.node_type == NodeType::Group
    }

    pub fn is_user(&self) -> bool {
        self.node_type == NodeType::User
    }

    pub fn is_data_group(&self) -> bool {
        self.is_group() && self.name.starts_with("data.")
    }

    /// Sharing groups are not user groups: the root users group must not be
    /// added as a member when they are created.
    pub fn is_user_group(&self) -> bool {
        self.is_group()
            && (self.name.starts_with("users.")
                || self.name.starts_with("user.")
                || self.is_root_users_group())
            && !self.name.starts_with("users.sharing_")
    }

    pub fn is_service_group(&self) -> bool {
        self.is_group() && self.name.starts_with("service.")
    }

    pub fn is_other_group(&self) -> bool {
        self.is_group() && !self.is_data_group() && !self.is_user_group() && !self.is_service_group()
    }

    pub fn is_root_users_group(&self) -> bool {
        self.is_group() && self.name == ROOT_USERS_GROUP
    }

    pub fn is_users_data_root_group(&self) -> bool {
        self.is_group() && self.name == USERS_DATA_ROOT_GROUP
    }

    pub fn is_de_permission_group(&self) -> bool {
        self.is_group() && self.name.starts_with("users.datalake.")
    }

    /// Only data groups, the root users group and DE permission groups may be
    /// referenced from other partitions.
    pub fn cross_partition_allowed(&self) -> bool {
        self.is_data_group() || self.is_root_users_group() || self.is_de_permission_group()
    }

    pub fn group_type(&self) -> GroupType {
        if self.is_data_group() {
            GroupType::Data
        } else if self.is_user_group() {
            GroupType::User
        } else if self.is_service_group() {
            GroupType::Service
        } else {
            GroupType::Other
        }
    }

    /// App ids this group is indexed under, defaulting to the sentinel key
    /// when the group carries no explicit app ids.
    pub fn effective_app_ids(&self) -> HashSet<String> {
        if self.app_ids.is_empty() {
            HashSet::from([DEFAULT_APP_ID_KEY.to_string()])
        } else {
            self.app_ids.clone()
        }
    }
}

/// An edge stored keyed by the child: "this node is a member of that group".
///
/// `role` is recorded on the direct edge and is `None` for references that
/// reach a node transitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentReference {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_partition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl ParentReference {
    pub fn for_group(group: &EntityNode) -> Self {
        Self {
            id: group.node_id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            data_partition_id: group.data_partition_id.clone(),
            role: None,
        }
    }

    pub fn for_group_with_role(group: &EntityNode, role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::for_group(group)
        }
    }

    pub fn is_root_users_group(&self) -> bool {
        self.name == ROOT_USERS_GROUP
    }

    pub fn is_data_group(&self) -> bool {
        self.name.starts_with("data.")
    }

    pub fn is_user_group(&self) -> bool {
        (self.name.starts_with("users.")
            || self.name.starts_with("user.")
            || self.is_root_users_group())
            && !self.name.starts_with("users.sharing_")
    }

    pub fn is_service_group(&self) -> bool {
        self.name.starts_with("service.")
    }

    /// Cross-partition referencing follows the same rules as for full nodes.
    pub fn cross_partition_allowed(&self) -> bool {
        self.is_data_group() || self.is_root_users_group() || self.name.starts_with("users.datalake.")
    }

    pub fn matches_group_type(&self, group_type: GroupType) -> bool {
        match group_type {
            GroupType::Data => self.is_data_group(),
            GroupType::User => self.is_user_group(),
            GroupType::Service => self.is_service_group(),
            GroupType::Other => {
                !self.is_data_group() && !self.is_user_group() && !self.is_service_group()
            }
        }
    }
}

/// An edge stored keyed by the parent: "that node is a member of this group".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildrenReference {
    pub id: String,
    pub data_partition_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub role: Role,
}

impl ChildrenReference {
    pub fn for_member(member: &EntityNode, role: Role) -> Self {
        Self {
            id: member.node_id.clone(),
            data_partition_id: member.data_partition_id.clone(),
            node_type: member.node_type,
            role,
        }
    }

    pub fn is_user(&self) -> bool {
        self.node_type == NodeType::User
    }

    pub fn is_group(&self) -> bool {
        self.node_type == NodeType::Group
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn is_users_data_root_group(&self) -> bool {
        self.id.starts_with("users.data.root@")
    }
}

/// Result of an ancestor closure query. Recomputed per query, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentTree {
    pub parent_references: HashSet<ParentReference>,
    pub max_depth: usize,
}

impl ParentTree {
    pub fn ids(&self) -> HashSet<&str> {
        self.parent_references.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Result of a descendant-user closure query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenTree {
    pub children_user_ids: Vec<String>,
    pub max_depth: usize,
}

/// One page of a partition's group listing. The cursor is opaque to callers;
/// backends encode it as an integer offset.
#[derive(Debug, Clone, Default)]
pub struct GroupsPage {
    pub groups: Vec<EntityNode>,
    pub next_cursor: Option<String>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_node_id_is_derived_from_name_and_domain() {
        let group = EntityNode::new_group("Data.X.Viewers", "opendes", "opendes.contoso.com");
        assert_eq!(group.node_id, "data.x.viewers@opendes.contoso.com");
        assert_eq!(group.name, "data.x.viewers");
        assert!(group.is_group());
        assert!(group.is_data_group());
        assert_eq!(group.group_type(), GroupType::Data);
    }

    #[test]
    fn group_email_parsing_extracts_partition() {
        let group = EntityNode::from_group_email("users.operators@tenant1.contoso.com");
        assert_eq!(group.data_partition_id, "tenant1");
        assert!(group.is_user_group());
    }

    #[test]
    fn root_users_group_is_a_user_group_but_sharing_groups_are_not() {
        let root = EntityNode::new_group("users", "p1", "p1.contoso.com");
        assert!(root.is_root_users_group());
        assert!(root.is_user_group());
        assert!(root.cross_partition_allowed());

        let sharing = EntityNode::new_group("users.sharing_abc", "p1", "p1.contoso.com");
        assert!(!sharing.is_user_group());
        assert!(sharing.is_other_group());
    }

    #[test]
    fn member_node_from_email_disambiguates_group_and_user() {
        let group =
            EntityNode::member_node_from_email("data.x@p1.contoso.com", "p1", "p1.contoso.com");
        assert!(group.is_group());

        let user = EntityNode::member_node_from_email("alice@corp.example.com", "p1", "p1.contoso.com");
        assert!(user.is_user());
        assert_eq!(user.data_partition_id, "p1");
    }

    #[test]
    fn effective_app_ids_defaults_to_sentinel() {
        let mut group = EntityNode::new_group("data.x", "p1", "p1.contoso.com");
        assert_eq!(
            group.effective_app_ids(),
            HashSet::from([DEFAULT_APP_ID_KEY.to_string()])
        );
        group.app_ids.insert("app1".to_string());
        assert_eq!(group.effective_app_ids(), HashSet::from(["app1".to_string()]));
    }

    #[test]
    fn parent_reference_group_type_matching() {
        let group = EntityNode::new_group("service.storage.admin", "p1", "p1.contoso.com");
        let reference = ParentReference::for_group(&group);
        assert!(reference.matches_group_type(GroupType::Service));
        assert!(!reference.matches_group_type(GroupType::Data));
        assert!(!reference.matches_group_type(GroupType::Other));
    }
}
