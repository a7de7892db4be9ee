//! The visited-state table.

use crate::config::MatchMode;
use crate::fingerprint::{Digest, Fingerprint};
use dashmap::{DashMap, DashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Dense id of a distinct state, in order of discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    New(StateId),
    /// Seen before. Hash-only tables do not remember ids.
    Seen(Option<StateId>),
}

impl Visit {
    pub fn is_new(self) -> bool {
        matches!(self, Visit::New(_))
    }

    pub fn id(self) -> Option<StateId> {
        match self {
            Visit::New(id) => Some(id),
            Visit::Seen(id) => id,
        }
    }
}

/// Every state reached during one run. Append-only until [`clear`](Self::clear).
///
/// In [`MatchMode::Full`] the table maps whole fingerprints to ids and its
/// answers are exact. In [`MatchMode::HashOnly`] it stores only digests, and
/// two states whose digests collide count as one.
pub struct VisitedStateTable {
    states: DashMap<Fingerprint, StateId>,
    digests: Option<DashSet<Digest>>,
    count: AtomicUsize,
    mode: MatchMode,
}

impl VisitedStateTable {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            states: DashMap::new(),
            digests: match mode {
                MatchMode::Full => None,
                MatchMode::HashOnly => Some(DashSet::new()),
            },
            count: AtomicUsize::new(0),
            mode,
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Record `fp`, returning its id if it was new.
    pub fn insert(&self, fp: Fingerprint) -> Visit {
        match &self.digests {
            Some(digests) => {
                if digests.insert(fp.digest()) {
                    Visit::New(self.next_id())
                } else {
                    Visit::Seen(None)
                }
            }
            None => {
                use dashmap::mapref::entry::Entry;
                match self.states.entry(fp) {
                    Entry::Occupied(seen) => Visit::Seen(Some(*seen.get())),
                    Entry::Vacant(slot) => {
                        let id = self.next_id();
                        slot.insert(id);
                        Visit::New(id)
                    }
                }
            }
        }
    }

    fn next_id(&self) -> StateId {
        StateId(self.count.fetch_add(1, Ordering::Relaxed) as u32)
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        match &self.digests {
            Some(digests) => digests.contains(&fp.digest()),
            None => self.states.contains_key(fp),
        }
    }

    /// Id of a visited state. Always `None` in hash-only mode.
    pub fn get(&self, fp: &Fingerprint) -> Option<StateId> {
        self.states.get(fp).map(|id| *id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, for a new run.
    pub fn clear(&mut self, mode: MatchMode) {
        *self = Self::new(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(words: &[i32]) -> Fingerprint {
        Fingerprint::new(words.to_vec())
    }

    #[test]
    fn test_full_mode_assigns_dense_ids() {
        let table = VisitedStateTable::new(MatchMode::Full);
        assert_eq!(table.insert(fp(&[1, 2])), Visit::New(StateId(0)));
        assert_eq!(table.insert(fp(&[1, 3])), Visit::New(StateId(1)));
        assert_eq!(table.insert(fp(&[1, 2])), Visit::Seen(Some(StateId(0))));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&fp(&[1, 3])), Some(StateId(1)));
        assert!(!table.contains(&fp(&[1])));
    }

    #[test]
    fn test_hash_only_mode() {
        let table = VisitedStateTable::new(MatchMode::HashOnly);
        assert!(table.insert(fp(&[4])).is_new());
        assert_eq!(table.insert(fp(&[4])), Visit::Seen(None));
        assert!(table.contains(&fp(&[4])));
        assert_eq!(table.get(&fp(&[4])), None);
        for i in 0..100_000 {
            table.insert(fp(&[i, i]));
        }
        assert_eq!(table.len(), 100_001);
        assert!(table.contains(&fp(&[77, 77])));
    }

    #[test]
    fn test_clear_switches_mode() {
        let mut table = VisitedStateTable::new(MatchMode::Full);
        table.insert(fp(&[1]));
        table.clear(MatchMode::HashOnly);
        assert!(table.is_empty());
        assert_eq!(table.mode(), MatchMode::HashOnly);
        assert!(table.insert(fp(&[1])).is_new());
    }
}
