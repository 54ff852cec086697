//! Storage layer for the rsent entitlements service.
//!
//! This crate defines the [`ReferenceStore`] contract over the denormalized
//! membership graph and provides two implementations:
//!
//! - [`MemoryReferenceStore`] - in-memory, for tests and single-process use
//! - [`PostgresReferenceStore`] - PostgreSQL-backed, for production use

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryReferenceStore;
pub use model::{
    ChildrenReference, ChildrenTree, EntityNode, GroupType, GroupsPage, NodeType, ParentReference,
    ParentTree, Role, DEFAULT_APP_ID_KEY, MAX_PARENTS, ROOT_USERS_GROUP, USERS_DATA_ROOT_GROUP,
};
pub use postgres::{PostgresConfig, PostgresReferenceStore};
pub use traits::ReferenceStore;
