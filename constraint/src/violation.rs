//! Violation reporting types.

use mew_core::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationSeverity {
    /// Hard constraint: aborts the transaction.
    Error,
    /// Soft constraint: reported alongside the result.
    Warning,
}

/// One failed constraint evaluation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub constraint_name: String,
    pub severity: ViolationSeverity,
    pub message: String,
    /// The bindings that falsified the condition.
    pub bindings: Vec<(String, EntityId)>,
}

impl Violation {
    pub fn new(
        constraint_name: impl Into<String>,
        severity: ViolationSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            severity,
            message: message.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_bindings(mut self, bindings: Vec<(String, EntityId)>) -> Self {
        self.bindings = bindings;
        self
    }
}

/// Collection of violations from one checking pass.
#[derive(Debug, Clone, Default)]
pub struct Violations {
    items: Vec<Violation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        // The same (constraint, bindings) pair can surface through several
        // touched entities; report it once.
        let duplicate = self.items.iter().any(|v| {
            v.constraint_name == violation.constraint_name && v.bindings == violation.bindings
        });
        if !duplicate {
            self.items.push(violation);
        }
    }

    pub fn extend(&mut self, other: Violations) {
        for violation in other.items {
            self.push(violation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn all(&self) -> &[Violation] {
        &self.items
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.items
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.items
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Warning)
    }

    pub fn first_error(&self) -> Option<&Violation> {
        self.errors().next()
    }
}
