//! Lazily evaluated check and plan registrations.
//!
//! Agents register `(id, closure)` pairs; closures run once, when the runtime
//! drains the registry, never at registration time.

use anyhow::Result;

use crate::core::types::{CheckResult, PlanStep};

type Thunk<'a, T> = Box<dyn FnOnce() -> Result<T> + 'a>;

/// One registered closure with its id.
pub struct Registration<'a, T> {
    pub id: String,
    thunk: Thunk<'a, T>,
}

impl<T> Registration<'_, T> {
    /// Evaluate the closure, consuming the registration.
    pub fn run(self) -> Result<T> {
        (self.thunk)()
    }
}

/// Ordered collection of registrations. Registration order is preserved.
pub struct Registry<'a, T> {
    entries: Vec<Registration<'a, T>>,
}

pub type CheckRegistry<'a> = Registry<'a, CheckResult>;
pub type PlanRegistry<'a> = Registry<'a, Vec<PlanStep>>;

impl<T> Default for Registry<'_, T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<'a, T> Registry<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<String>, thunk: F)
    where
        F: FnOnce() -> Result<T> + 'a,
    {
        self.entries.push(Registration {
            id: id.into(),
            thunk: Box::new(thunk),
        });
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand out registrations in order for evaluation.
    pub fn into_entries(self) -> Vec<Registration<'a, T>> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::core::types::{CheckCategory, Severity};

    #[test]
    fn closures_are_not_evaluated_at_registration() {
        let calls = Cell::new(0);
        let mut registry = CheckRegistry::new();
        registry.register("c", || {
            calls.set(calls.get() + 1);
            Ok(CheckResult::new("a", "c", Severity::Pass, CheckCategory::Runtime))
        });
        assert_eq!(calls.get(), 0);

        let results: Vec<_> = registry
            .into_entries()
            .into_iter()
            .map(|entry| entry.run().expect("run"))
            .collect();
        assert_eq!(calls.get(), 1);
        assert_eq!(results[0].id, "c");
    }

    #[test]
    fn entries_keep_registration_order() {
        let mut registry = PlanRegistry::new();
        registry.register("b", || Ok(Vec::new()));
        registry.register("a", || Ok(Vec::new()));
        assert_eq!(registry.ids(), vec!["b", "a"]);
        assert_eq!(registry.len(), 2);
    }
}
