//! Resolver configuration.

use rsent_storage::MAX_PARENTS;

/// Configuration for closure resolution.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum number of ancestor groups a traversal may accumulate before
    /// it is abandoned with a precondition failure.
    pub max_parents: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_parents: MAX_PARENTS,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parents(mut self, max_parents: usize) -> Self {
        self.max_parents = max_parents;
        self
    }
}
