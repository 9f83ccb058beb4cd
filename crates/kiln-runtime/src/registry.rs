//! Registered source units

use rustc_hash::FxHashMap;

/// Lifecycle of a registered unit
///
/// A unit whose batch failed is removed outright, so there is no rolled-back
/// state: the name simply becomes unknown again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Registered, waiting for the next batch
    Pending,
    /// Part of a batch that compiled successfully; immutable from now on
    Compiled,
}

/// One registered unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Qualified name (`pkg.Name`)
    pub name: String,
    pub text: String,
    pub status: SourceStatus,
}

/// Every unit known to one compiler instance, keyed by qualified name
#[derive(Debug, Default)]
pub struct SourceRegistry {
    units: FxHashMap<String, SourceUnit>,
    /// Pending names in registration order
    pending: Vec<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as pending. Returns `false` without touching anything
    /// when the name is already known, pending or compiled.
    pub fn add(&mut self, name: &str, text: &str) -> bool {
        if self.units.contains_key(name) {
            return false;
        }
        self.units.insert(
            name.to_string(),
            SourceUnit {
                name: name.to_string(),
                text: text.to_string(),
                status: SourceStatus::Pending,
            },
        );
        self.pending.push(name.to_string());
        true
    }

    /// Pending units in registration order
    pub fn pending_units(&self) -> Vec<&SourceUnit> {
        self.pending
            .iter()
            .filter_map(|name| self.units.get(name))
            .collect()
    }

    pub fn pending_names(&self) -> &[String] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Every pending unit becomes compiled
    pub fn mark_compiled(&mut self) {
        for name in self.pending.drain(..) {
            if let Some(unit) = self.units.get_mut(&name) {
                unit.status = SourceStatus::Compiled;
            }
        }
    }

    /// Forget every pending unit, text included. Returns the purged names in
    /// registration order.
    pub fn rollback(&mut self) -> Vec<String> {
        let purged: Vec<String> = self.pending.drain(..).collect();
        for name in &purged {
            self.units.remove(name);
        }
        purged
    }

    pub fn get(&self, name: &str) -> Option<&SourceUnit> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn is_compiled(&self, name: &str) -> bool {
        self.units
            .get(name)
            .is_some_and(|u| u.status == SourceStatus::Compiled)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
