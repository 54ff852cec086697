//! Transitive membership resolution.
//!
//! Answers "which groups does this identity belong to, directly or through
//! nested groups" and its mirror "which users does this group contain". Both
//! are pure reads over the reference store; traversal state lives on the
//! resolver's stack only.

mod closure;
mod config;

pub use closure::ClosureResolver;
pub use config::ResolverConfig;
