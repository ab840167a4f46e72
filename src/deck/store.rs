use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::entry::Entry;

pub type SharedDeckStore = Arc<RwLock<DeckStore>>;

/// Client-side cache of the persisted deck.
///
/// Entries are keyed by id so the collection never holds duplicates; iteration
/// follows the order entries were loaded or appended in. Every mutation bumps
/// `revision` so derived views know when to recompute.
#[derive(Debug, Default)]
pub struct DeckStore {
    entries: IndexMap<i64, Entry>,
    loaded: bool,
    revision: u64,
    epoch: u64,
    unsynced: Vec<Change>,
}

/// A committed mutation recorded while the initial load is outstanding.
#[derive(Debug, Clone)]
enum Change {
    Added(Entry),
    Removed(i64),
}

impl DeckStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedDeckStore {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bumped by [`DeckStore::reset`]; a pending load started in an earlier
    /// epoch must not apply its result.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Appends `entry`. Returns false and leaves the store untouched when an
    /// entry with the same id is already present.
    pub fn add(&mut self, entry: Entry) -> bool {
        if self.entries.contains_key(&entry.id) {
            return false;
        }
        if !self.loaded {
            self.unsynced.push(Change::Added(entry.clone()));
        }
        self.entries.insert(entry.id, entry);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, id: i64) -> Option<Entry> {
        let removed = self.entries.shift_remove(&id);
        if removed.is_some() {
            if !self.loaded {
                self.unsynced.push(Change::Removed(id));
            }
            self.revision += 1;
        }
        removed
    }

    /// Replaces the whole collection. Later duplicates of an id are dropped.
    pub fn replace(&mut self, entries: Vec<Entry>) {
        let mut next = IndexMap::with_capacity(entries.len());
        for entry in entries {
            if next.contains_key(&entry.id) {
                tracing::warn!(entry_id = entry.id, "dropping duplicate deck entry");
                continue;
            }
            next.insert(entry.id, entry);
        }
        self.entries = next;
        self.revision += 1;
    }

    pub fn set_loaded(&mut self) {
        self.loaded = true;
        self.unsynced.clear();
    }

    /// Installs the initial load, then replays the adds and removes committed
    /// while it was in flight, so rows persisted after the gateway read are kept.
    pub fn install_loaded(&mut self, entries: Vec<Entry>) {
        let changes = std::mem::take(&mut self.unsynced);
        self.replace(entries);
        for change in changes {
            match change {
                Change::Added(entry) => {
                    if !self.entries.contains_key(&entry.id) {
                        self.entries.insert(entry.id, entry);
                    }
                }
                Change::Removed(id) => {
                    self.entries.shift_remove(&id);
                }
            }
        }
        self.set_loaded();
    }

    /// Empties the store and re-arms the one-shot initial load.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.unsynced.clear();
        self.loaded = false;
        self.revision += 1;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::entry::Attributes;

    fn entry(id: i64, name: &str) -> Entry {
        Entry::new(id, name, "", vec![], Attributes::default())
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut store = DeckStore::new();
        assert!(store.add(entry(4, "charmander")));
        let revision = store.revision();
        assert!(!store.add(entry(4, "charmander-again")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
        assert_eq!(store.get(4).map(|e| e.name.as_str()), Some("charmander"));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut store = DeckStore::new();
        store.replace(vec![entry(1, "a"), entry(2, "b"), entry(3, "c")]);
        assert!(store.remove(2).is_some());
        assert!(store.remove(2).is_none());
        let ids: Vec<i64> = store.entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn replace_drops_duplicate_ids() {
        let mut store = DeckStore::new();
        store.replace(vec![entry(1, "a"), entry(1, "a2"), entry(2, "b")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).map(|e| e.name.as_str()), Some("a"));
    }

    #[test]
    fn reset_rearms_loaded_flag_and_bumps_epoch() {
        let mut store = DeckStore::new();
        store.replace(vec![entry(1, "a")]);
        store.set_loaded();
        let epoch = store.epoch();
        store.reset();
        assert!(!store.is_loaded());
        assert!(store.is_empty());
        assert_eq!(store.epoch(), epoch + 1);
    }

    #[test]
    fn install_loaded_keeps_changes_made_while_loading() {
        let mut store = DeckStore::new();
        store.add(entry(6, "charizard"));
        store.add(entry(7, "squirtle"));
        store.remove(7);

        // The load saw squirtle's insert but neither its removal nor charizard.
        store.install_loaded(vec![entry(1, "bulbasaur"), entry(7, "squirtle")]);
        let ids: Vec<i64> = store.entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 6]);
        assert!(store.is_loaded());

        store.add(entry(9, "blastoise"));
        store.reset();
        store.install_loaded(vec![entry(1, "bulbasaur")]);
        assert_eq!(store.len(), 1);
    }
}
