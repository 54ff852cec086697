//! Mutation operation engine.
//!
//! Every graph mutation is decomposed into a sequence of single-key steps,
//! each paired with an inverse. The [`OperationRunner`] executes a sequence
//! in order and unwinds the committed prefix in reverse when a step fails,
//! so a half-applied mutation converges back to a consistent graph without
//! multi-key transactions from the backend.

mod ops;
mod runner;

pub use ops::{
    AddAppIdAssociationOperation, AddChildRefOperation, AddParentRefOperation,
    AddUserPartitionAssociationOperation, CreateGroupNodeOperation, CreateMemberNodeOperation,
    DeleteGroupNodeOperation, Operation, RemoveAppIdAssociationOperation, RemoveChildRefOperation,
    RemoveParentRefOperation, RemoveUserPartitionAssociationOperation,
    UpdateNodeAppIdsOperation,
};
pub use runner::{OperationRunner, RunnerConfig};
