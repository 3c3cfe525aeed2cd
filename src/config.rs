use serde::Deserialize;

use crate::{pool::DEFAULT_CAPACITY, sql::Dialect};

/// Limits and defaults for a [`Compiler`](crate::Compiler).
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "dialect": "postgres", "max_top": 500 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Largest list accepted on the right of `in`; `None` for no limit
    pub max_in_clause_size: Option<usize>,

    /// Largest `$top` accepted; `None` for no limit
    pub max_top: Option<u64>,

    /// How deeply `$expand` may nest, counting the outermost level as 1
    pub max_expand_depth: usize,

    pub dialect: Dialect,

    /// Free syntax-tree slots kept for reuse
    pub pool_capacity: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_in_clause_size: Some(1000),
            max_top: None,
            max_expand_depth: 3,
            dialect: Dialect::default(),
            pool_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl CompilerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_max_in_clause_size(mut self, max: Option<usize>) -> Self {
        self.max_in_clause_size = max;
        self
    }

    pub fn with_max_top(mut self, max: Option<u64>) -> Self {
        self.max_top = max;
        self
    }

    pub fn with_max_expand_depth(mut self, depth: usize) -> Self {
        self.max_expand_depth = depth;
        self
    }
}
