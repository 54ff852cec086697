//! Domain layer of the rsent entitlements service.
//!
//! Builds the group-membership use cases on top of a [`ReferenceStore`]:
//! transitive closure resolution, the compensating mutation engine, policy
//! and validation checks, and audit publication.
//!
//! [`ReferenceStore`]: rsent_storage::ReferenceStore

pub mod audit;
pub mod error;
pub mod operations;
pub mod resolver;
pub mod service;
pub mod validation;

pub use audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, LogAuditSink};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use operations::{Operation, OperationRunner, RunnerConfig};
pub use resolver::{ClosureResolver, ResolverConfig};
pub use service::{
    AddMemberRequest, CreateGroupRequest, GroupService, RemoveMemberRequest, ServiceConfig,
};
pub use validation::{ProtectedMembersConfig, ServiceAccountsConfig};
