//! Append-only history with age-based pruning

use super::aggregator::filter_by_age;
use super::HistoryEntry;
use std::collections::VecDeque;

/// An ordered history of entries.
///
/// Not synchronized itself; the owner decides the locking scope (the
/// assessor keeps both of its histories behind one mutex).
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: HistoryEntry + Clone> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: T) {
        self.entries.push_back(entry);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    /// Replace the contents with the entries inside the retention window.
    /// Returns how many entries were dropped.
    pub fn prune_older_than(&mut self, retention_secs: u64, now: i64) -> usize {
        let before = self.entries.len();
        let kept = filter_by_age(self.entries.make_contiguous(), retention_secs, now);
        self.entries = kept.into();
        before - self.entries.len()
    }

    /// Overwrite the first entry matching the predicate in place.
    /// Returns false when nothing matched.
    pub fn replace_where<F>(&mut self, mut predicate: F, entry: T) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        match self.entries.iter_mut().find(|e| predicate(&**e)) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventType, Operator};
    use std::sync::Arc;

    fn event(time: i64) -> Arc<Event> {
        Arc::new(Event::new("g", "t", time, 1.0, 0.0, EventType::Breach, Operator::Gt))
    }

    #[test]
    fn test_append_and_snapshot() {
        let mut history = History::new();
        history.append(event(1));
        history.append(event(2));

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].time, 1);
        assert_eq!(snapshot[1].time, 2);
    }

    #[test]
    fn test_prune_drops_old_entries() {
        let mut history = History::new();
        for t in [100, 150, 190, 200] {
            history.append(event(t));
        }

        let dropped = history.prune_older_than(30, 200);
        assert_eq!(dropped, 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut history = History::new();
        for t in [100, 150, 190, 200] {
            history.append(event(t));
        }

        history.prune_older_than(30, 200);
        let first = history.snapshot();
        let dropped = history.prune_older_than(30, 200);
        assert_eq!(dropped, 0);
        assert_eq!(history.snapshot(), first);
    }

    #[test]
    fn test_prune_zero_retention_empties() {
        let mut history = History::new();
        history.append(event(200));
        history.prune_older_than(0, 200);
        assert!(history.is_empty());
    }
}
