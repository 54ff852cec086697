//! Fire-and-forget audit publication.

use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CreateGroup,
    DeleteGroup,
    AddMember,
    RemoveMember,
    UpdateAppIds,
    RenameGroup,
}

impl AuditAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateGroup => "create_group",
            AuditAction::DeleteGroup => "delete_group",
            AuditAction::AddMember => "add_member",
            AuditAction::RemoveMember => "remove_member",
            AuditAction::UpdateAppIds => "update_app_ids",
            AuditAction::RenameGroup => "rename_group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit record, emitted exactly once per mutation attempt.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub data_partition_id: String,
    pub action: AuditAction,
    pub resources: Vec<String>,
    pub outcome: AuditOutcome,
}

/// Destination for audit events. Publication must never fail the mutation
/// it describes.
pub trait AuditSink: Send + Sync {
    fn publish(&self, event: AuditEvent);
}

/// Sink that writes audit events to the structured log.
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn publish(&self, event: AuditEvent) {
        info!(
            timestamp = %event.timestamp.to_rfc3339(),
            actor = %event.actor,
            data_partition_id = %event.data_partition_id,
            action = event.action.as_str(),
            resources = ?event.resources,
            success = event.outcome == AuditOutcome::Success,
            "audit"
        );
    }
}
