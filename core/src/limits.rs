//! Engine resource limits.

/// Tunable budgets enforced by the kernel. Every limit has a defined error
/// code in the envelope (E5xxx).
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Maximum nested rule activation chain length per transaction.
    pub max_rule_depth: usize,
    /// Maximum total rule actions per transaction.
    pub max_rule_actions: usize,
    /// Rows an unbounded (no LIMIT) query may return before a warning.
    pub max_unbounded_results: usize,
    /// Maximum elements gathered by collecting operators.
    pub max_collect_size: usize,
    /// Maximum entities deleted by a single cascade.
    pub max_cascade_count: usize,
    /// Default transitive-traversal depth window (min, max).
    pub default_traversal_depth: (i64, i64),
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_rule_depth: 100,
            max_rule_actions: 10_000,
            max_unbounded_results: 10_000,
            max_collect_size: 10_000,
            max_cascade_count: 10_000,
            default_traversal_depth: (1, 100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_budgets() {
        let limits = EngineLimits::default();
        assert_eq!(limits.max_rule_depth, 100);
        assert_eq!(limits.max_rule_actions, 10_000);
        assert_eq!(limits.max_unbounded_results, 10_000);
        assert_eq!(limits.max_cascade_count, 10_000);
        assert_eq!(limits.default_traversal_depth, (1, 100));
    }
}
