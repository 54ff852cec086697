//! Domain error types and the error taxonomy they map onto.

use thiserror::Error;

use rsent_storage::StorageError;

/// Category an error falls into at the service boundary. Outer layers map
/// these onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PreconditionFailed,
    BadRequest,
    Unauthorized,
    Internal,
}

/// Domain-specific errors.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("group not found: {group_id}")]
    GroupNotFound { group_id: String },

    #[error("member {member_id} not found in group {group_id}")]
    MemberNotFound { member_id: String, group_id: String },

    #[error("node already exists: {node_id}")]
    AlreadyExists { node_id: String },

    #[error("{member_id} is already a member of group {group_id}")]
    AlreadyMember { member_id: String, group_id: String },

    /// A single-key optimistic write lost its race. Retryable.
    #[error("concurrent operation on the same resource: {key}")]
    ConcurrentModification { key: String },

    /// Adding the member would create a membership cycle.
    #[error("adding {member_id} to {group_id} would create a cyclic membership")]
    CyclicMembership { member_id: String, group_id: String },

    /// The member already belongs to the maximum number of groups.
    #[error("{node_id} belongs to {limit} groups, the maximum allowed")]
    ParentQuotaExceeded { node_id: String, limit: usize },

    #[error("user {user_id} is associated with the maximum number of partitions")]
    PartitionQuotaExceeded { user_id: String },

    #[error("invalid email: {value}")]
    InvalidEmail { value: String },

    #[error("group {group_id} does not belong to partition {partition_id}")]
    PartitionMismatch {
        group_id: String,
        partition_id: String,
    },

    #[error("invalid cursor: {cursor}")]
    InvalidCursor { cursor: String },

    #[error("invalid partition list: {message}")]
    InvalidPartitionList { message: String },

    /// Removal of a protected member (service accounts, the data-root link)
    /// is refused outright.
    #[error("member {member_id} cannot be removed from group {group_id}")]
    ProtectedMember { member_id: String, group_id: String },

    #[error("not authorized: {message}")]
    NotAuthorized { message: String },

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Storage(StorageError),
}

impl DomainError {
    /// The taxonomy category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::GroupNotFound { .. } | DomainError::MemberNotFound { .. } => {
                ErrorKind::NotFound
            }
            DomainError::AlreadyExists { .. }
            | DomainError::AlreadyMember { .. }
            | DomainError::ConcurrentModification { .. } => ErrorKind::Conflict,
            DomainError::CyclicMembership { .. }
            | DomainError::ParentQuotaExceeded { .. }
            | DomainError::PartitionQuotaExceeded { .. } => ErrorKind::PreconditionFailed,
            DomainError::InvalidEmail { .. }
            | DomainError::PartitionMismatch { .. }
            | DomainError::InvalidCursor { .. }
            | DomainError::InvalidPartitionList { .. }
            | DomainError::Validation { .. } => ErrorKind::BadRequest,
            DomainError::ProtectedMember { .. } | DomainError::NotAuthorized { .. } => {
                ErrorKind::Unauthorized
            }
            DomainError::Timeout { .. } | DomainError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the failed step may succeed. Only lost optimistic
    /// writes qualify; a timed-out write may have landed and must not be
    /// replayed blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::ConcurrentModification { .. })
    }
}

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NodeAlreadyExists { node_id } => DomainError::AlreadyExists { node_id },
            StorageError::ConcurrentModification { key } => {
                DomainError::ConcurrentModification { key }
            }
            StorageError::InvalidCursor { cursor } => DomainError::InvalidCursor { cursor },
            other => DomainError::Storage(other),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_mapping() {
        assert_eq!(
            DomainError::GroupNotFound {
                group_id: "g".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DomainError::CyclicMembership {
                member_id: "m".into(),
                group_id: "g".into()
            }
            .kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            DomainError::ProtectedMember {
                member_id: "m".into(),
                group_id: "g".into()
            }
            .kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn only_lost_writes_are_retryable() {
        assert!(DomainError::ConcurrentModification { key: "k".into() }.is_retryable());
        assert!(!DomainError::Timeout { duration_ms: 100 }.is_retryable());
        assert!(!DomainError::AlreadyMember {
            member_id: "m".into(),
            group_id: "g".into()
        }
        .is_retryable());
    }

    #[test]
    fn storage_errors_convert_into_domain_errors() {
        let err: DomainError = StorageError::ConcurrentModification { key: "k".into() }.into();
        assert!(err.is_retryable());

        let err: DomainError = StorageError::NodeAlreadyExists { node_id: "n".into() }.into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
