//! Input validation and tenancy policy helpers.

use std::collections::HashSet;

use serde::Deserialize;

use rsent_storage::{EntityNode, ROOT_USERS_GROUP, USERS_DATA_ROOT_GROUP};

use crate::error::{DomainError, DomainResult};

/// Partition id shared-resource tenants use alongside their own partition.
pub const COMMON_PARTITION: &str = "common";

const MAX_EMAIL_SIDE_LEN: usize = 256;

fn is_valid_email_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-')
}

/// Validates an email-shaped identifier: one `@`, both sides non-empty,
/// bounded in length and drawn from a conservative character set.
pub fn validate_email(value: &str) -> DomainResult<()> {
    let invalid = || DomainError::InvalidEmail {
        value: value.to_string(),
    };
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || local.len() > MAX_EMAIL_SIDE_LEN
        || domain.len() > MAX_EMAIL_SIDE_LEN
        || domain.contains('@')
    {
        return Err(invalid());
    }
    if !local.chars().all(is_valid_email_char)
        || !domain.chars().all(is_valid_email_char)
    {
        return Err(invalid());
    }
    Ok(())
}

/// Validates a group name: the local part of the eventual group email.
pub fn validate_group_name(name: &str) -> DomainResult<()> {
    if name.is_empty() || name.len() > MAX_EMAIL_SIDE_LEN || !name.chars().all(is_valid_email_char)
    {
        return Err(DomainError::Validation {
            message: format!("invalid group name: {name}"),
        });
    }
    Ok(())
}

/// Checks that a group email belongs to the partition being operated on.
pub fn validate_group_in_partition(
    group_email: &str,
    partition_id: &str,
    partition_domain: &str,
) -> DomainResult<()> {
    validate_email(group_email)?;
    if !group_email.ends_with(&format!("@{partition_domain}")) {
        return Err(DomainError::PartitionMismatch {
            group_id: group_email.to_string(),
            partition_id: partition_id.to_string(),
        });
    }
    Ok(())
}

/// Checks the partition header of a single-partition request.
pub fn validate_single_partition(partition_id: &str) -> DomainResult<()> {
    if partition_id.trim().is_empty() {
        return Err(DomainError::InvalidPartitionList {
            message: "no partition provided".to_string(),
        });
    }
    Ok(())
}

/// Validates the partition list of a membership listing request. A caller
/// may name at most two partitions, and two only when one of them is the
/// common partition.
pub fn validate_list_group_partitions(partition_ids: &[String]) -> DomainResult<()> {
    match partition_ids {
        [] => Err(DomainError::InvalidPartitionList {
            message: "no partition provided".to_string(),
        }),
        [_] => Ok(()),
        [a, b] => {
            if a == COMMON_PARTITION || b == COMMON_PARTITION {
                Ok(())
            } else {
                Err(DomainError::NotAuthorized {
                    message: "listing two partitions requires one of them to be common"
                        .to_string(),
                })
            }
        }
        _ => Err(DomainError::InvalidPartitionList {
            message: format!("{} partitions provided, at most 2 allowed", partition_ids.len()),
        }),
    }
}

/// Members that must never be removed from specific groups, loaded from
/// deployment configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtectedMembersConfig {
    #[serde(default)]
    pub groups: Vec<ProtectedGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedGroup {
    pub name: String,
    #[serde(default)]
    pub members: Vec<ProtectedMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedMember {
    pub name: String,
}

impl ProtectedMembersConfig {
    pub fn from_json(raw: &str) -> DomainResult<Self> {
        serde_json::from_str(raw).map_err(|e| DomainError::Validation {
            message: format!("invalid protected members configuration: {e}"),
        })
    }

    /// Protection applies within one partition only; a foreign member that
    /// happens to share a protected name may still be removed.
    pub fn is_member_protected(&self, group: &EntityNode, member: &EntityNode) -> bool {
        if group.data_partition_id != member.data_partition_id {
            return false;
        }
        self.groups.iter().any(|g| {
            g.name == group.name && g.members.iter().any(|m| m.name == member.name)
        })
    }
}

/// Deployment identities and the groups seeded at partition provisioning.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountsConfig {
    /// The deployment's own service account, protected from removal
    /// everywhere.
    pub service_account: String,
    /// Groups provisioned with the partition that must not be deleted.
    #[serde(default = "ServiceAccountsConfig::default_bootstrap_groups")]
    pub bootstrap_groups: HashSet<String>,
}

impl ServiceAccountsConfig {
    fn default_bootstrap_groups() -> HashSet<String> {
        HashSet::from([
            ROOT_USERS_GROUP.to_string(),
            USERS_DATA_ROOT_GROUP.to_string(),
        ])
    }

    pub fn new(service_account: &str) -> Self {
        Self {
            service_account: service_account.to_lowercase(),
            bootstrap_groups: Self::default_bootstrap_groups(),
        }
    }

    pub fn is_service_account(&self, member_id: &str) -> bool {
        member_id.eq_ignore_ascii_case(&self.service_account)
    }

    /// The service account cannot leave the groups it was provisioned into.
    /// Ordinary memberships of the service account stay removable, and the
    /// check never crosses partitions.
    pub fn is_member_protected(&self, group: &EntityNode, member: &EntityNode) -> bool {
        if group.data_partition_id != member.data_partition_id {
            return false;
        }
        self.is_service_account(&member.node_id) && self.is_bootstrap_group(&group.name)
    }

    pub fn is_bootstrap_group(&self, group_name: &str) -> bool {
        self.bootstrap_groups.contains(group_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_validated_structurally() {
        assert!(validate_email("alice@corp.example.com").is_ok());
        assert!(validate_email("data.x.viewers@p1.contoso.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@corp.example.com").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("ali ce@corp.example.com").is_err());
        assert!(validate_email("alice@corp@example.com").is_err());
    }

    #[test]
    fn group_names_reject_whitespace_and_empties() {
        assert!(validate_group_name("data.x.viewers").is_ok());
        assert!(validate_group_name("").is_err());
        assert!(validate_group_name("bad name").is_err());
    }

    #[test]
    fn group_partition_membership_is_checked_by_domain_suffix() {
        assert!(
            validate_group_in_partition("data.x@p1.contoso.com", "p1", "p1.contoso.com").is_ok()
        );
        let err = validate_group_in_partition("data.x@p2.contoso.com", "p1", "p1.contoso.com")
            .unwrap_err();
        assert!(matches!(err, DomainError::PartitionMismatch { .. }));
    }

    #[test]
    fn partition_list_rules() {
        assert!(validate_list_group_partitions(&[]).is_err());
        assert!(validate_list_group_partitions(&["p1".into()]).is_ok());
        assert!(validate_list_group_partitions(&["p1".into(), "common".into()]).is_ok());
        assert!(matches!(
            validate_list_group_partitions(&["p1".into(), "p2".into()]).unwrap_err(),
            DomainError::NotAuthorized { .. }
        ));
        assert!(validate_list_group_partitions(&["p1".into(), "p2".into(), "common".into()])
            .is_err());
    }

    #[test]
    fn protected_members_are_scoped_to_their_partition() {
        let config = ProtectedMembersConfig::from_json(
            r#"{"groups":[{"name":"users","members":[{"name":"keeper@corp.example.com"}]}]}"#,
        )
        .unwrap();

        let group = EntityNode::new_group("users", "p1", "p1.contoso.com");
        let keeper = EntityNode::new_user("keeper@corp.example.com", "p1");
        let foreign_keeper = EntityNode::new_user("keeper@corp.example.com", "p2");
        let other = EntityNode::new_user("alice@corp.example.com", "p1");

        assert!(config.is_member_protected(&group, &keeper));
        assert!(!config.is_member_protected(&group, &foreign_keeper));
        assert!(!config.is_member_protected(&group, &other));
    }

    #[test]
    fn service_account_matching_is_case_insensitive() {
        let config = ServiceAccountsConfig::new("Svc@Corp.Example.com");
        assert!(config.is_service_account("svc@corp.example.com"));
        assert!(!config.is_service_account("other@corp.example.com"));
        assert!(config.is_bootstrap_group("users"));
        assert!(config.is_bootstrap_group("users.data.root"));
        assert!(!config.is_bootstrap_group("data.x"));
    }

    #[test]
    fn service_account_protection_is_paired_with_its_bootstrap_groups() {
        let config = ServiceAccountsConfig::new("svc@corp.example.com");
        let svc = EntityNode::new_user("svc@corp.example.com", "p1");
        let foreign_svc = EntityNode::new_user("svc@corp.example.com", "p2");
        let alice = EntityNode::new_user("alice@corp.example.com", "p1");

        let root_users = EntityNode::new_group("users", "p1", "p1.contoso.com");
        let ops = EntityNode::new_group("users.ops", "p1", "p1.contoso.com");

        assert!(config.is_member_protected(&root_users, &svc));
        assert!(!config.is_member_protected(&ops, &svc));
        assert!(!config.is_member_protected(&root_users, &foreign_svc));
        assert!(!config.is_member_protected(&root_users, &alice));
    }
}
