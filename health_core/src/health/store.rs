//! Latest result per check, with generation fencing for abandoned executions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::result::CheckResult;

pub type ResultSnapshot = Arc<BTreeMap<String, CheckResult>>;

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u64,
    committed: bool,
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    by_name: HashMap<String, Slot>,
}

impl Slots {
    fn open(&mut self, name: &str) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.by_name.insert(
            name.to_string(),
            Slot {
                generation,
                committed: false,
            },
        );
        generation
    }
}

/// Writers take the slot lock and publish a fresh copy of the map, so a snapshot is
/// an `Arc` clone that can never observe half of an update.
#[derive(Default)]
pub struct ResultStore {
    slots: Mutex<Slots>,
    results: RwLock<ResultSnapshot>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new execution for `name` and returns its generation token.
    /// Any generation handed out earlier for that name becomes stale.
    pub fn begin(&self, name: &str) -> u64 {
        self.slots.lock().open(name)
    }

    /// Like [`ResultStore::begin`], but opens nothing once `cancel` has fired. The
    /// token is read under the slot lock, so a `remove` issued after cancelling
    /// always clears whatever this opened.
    pub fn begin_unless_cancelled(&self, name: &str, cancel: &CancellationToken) -> Option<u64> {
        let mut slots = self.slots.lock();
        if cancel.is_cancelled() {
            return None;
        }
        Some(slots.open(name))
    }

    /// Writes `result` if `generation` is still the open execution for `name`.
    /// Returns the stored result (with its failure streak filled in), or `None`
    /// when the write was stale and discarded.
    pub fn commit(&self, name: &str, generation: u64, result: CheckResult) -> Option<CheckResult> {
        let mut slots = self.slots.lock();
        let slot = slots.by_name.get_mut(name)?;
        if slot.generation != generation || slot.committed {
            return None;
        }
        slot.committed = true;

        let mut results = self.results.write();
        let result = result.following(results.get(name));
        let mut next = BTreeMap::clone(&results);
        next.insert(name.to_string(), result.clone());
        *results = Arc::new(next);
        Some(result)
    }

    /// Unconditional overwrite, outside the generation protocol.
    pub fn put(&self, name: &str, result: CheckResult) {
        let _slots = self.slots.lock();
        let mut results = self.results.write();
        let mut next = BTreeMap::clone(&results);
        next.insert(name.to_string(), result);
        *results = Arc::new(next);
    }

    pub fn remove(&self, name: &str) -> Option<CheckResult> {
        let mut slots = self.slots.lock();
        slots.by_name.remove(name);

        let mut results = self.results.write();
        if !results.contains_key(name) {
            return None;
        }
        let mut next = BTreeMap::clone(&results);
        let removed = next.remove(name);
        *results = Arc::new(next);
        removed
    }

    pub fn get(&self, name: &str) -> Option<CheckResult> {
        self.results.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        self.results.read().clone()
    }
}
