//! Run options the orchestrator consumes.

use crate::policy::TableKey;

/// Lowest allowed probe parallelism.
pub const MIN_PARALLELISM: usize = 1;
/// Highest allowed probe parallelism. Shared databases (Supabase poolers in
/// particular) hand out small connection budgets; the pool is sized to this
/// knob, so the cap also bounds server-side connections.
pub const MAX_PARALLELISM: usize = 10;
/// Parallelism used when the caller does not say otherwise.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restrict the run to one table.
    pub target_table: Option<TableKey>,

    /// Probe tables outside the `public` schema too (system schemas stay
    /// excluded either way).
    pub include_system_schemas: bool,

    /// Worker count, clamped to `[MIN_PARALLELISM, MAX_PARALLELISM]`.
    parallelism: usize,

    /// Probe as this real user (email or id in `auth.users`) instead of
    /// the plan's scenarios.
    pub as_user: Option<String>,
}

impl RunOptions {
    /// Create options with the given parallelism, clamping it into range.
    pub fn new(parallelism: usize) -> Self {
        Self {
            target_table: None,
            include_system_schemas: false,
            parallelism: parallelism.clamp(MIN_PARALLELISM, MAX_PARALLELISM),
            as_user: None,
        }
    }

    /// Restrict the run to one table.
    pub fn target_table(mut self, table: TableKey) -> Self {
        self.target_table = Some(table);
        self
    }

    /// Include non-public schemas.
    pub fn include_system_schemas(mut self, include: bool) -> Self {
        self.include_system_schemas = include;
        self
    }

    /// Probe as a real user from `auth.users`.
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.as_user = Some(user.into());
        self
    }

    /// The clamped worker count.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Whether a table is in scope under these options.
    pub fn table_in_scope(&self, key: &TableKey) -> bool {
        if let Some(target) = &self.target_table {
            if target != key {
                return false;
            }
        }
        self.include_system_schemas || key.is_public_schema()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_clamped() {
        assert_eq!(RunOptions::new(0).parallelism(), MIN_PARALLELISM);
        assert_eq!(RunOptions::new(4).parallelism(), 4);
        assert_eq!(RunOptions::new(64).parallelism(), MAX_PARALLELISM);
    }

    #[test]
    fn test_table_scope_public_only_by_default() {
        let options = RunOptions::default();
        assert!(options.table_in_scope(&TableKey::new("public", "todos")));
        assert!(!options.table_in_scope(&TableKey::new("audit", "events")));

        let options = options.include_system_schemas(true);
        assert!(options.table_in_scope(&TableKey::new("audit", "events")));
    }

    #[test]
    fn test_target_table_filter() {
        let options = RunOptions::default().target_table(TableKey::new("public", "todos"));
        assert!(options.table_in_scope(&TableKey::new("public", "todos")));
        assert!(!options.table_in_scope(&TableKey::new("public", "posts")));
    }
}
