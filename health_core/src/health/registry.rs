use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::entry::{CheckEntry, Severity};
use crate::error::{HealthError, Result};

/// Registered checks by name.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<BTreeMap<String, Arc<CheckEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CheckEntry) -> Result<Arc<CheckEntry>> {
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.name) {
            return Err(HealthError::DuplicateName(entry.name));
        }

        let entry = Arc::new(entry);
        entries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CheckEntry>> {
        self.entries.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CheckEntry>> {
        self.entries.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn severities(&self) -> BTreeMap<String, Severity> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.severity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
