//! A deadline-ordered queue of pending callbacks.

use super::Callback;
use crate::common::{Millis, ScheduleHandle};
use slotmap::SlotMap;
use std::collections::BTreeSet;

struct Entry {
    deadline: Millis,
    seq: u64,
    callback: Callback,
}

/// Pending callbacks ordered by deadline, then by insertion order.
///
/// Handles are `slotmap` keys, so removing an entry is O(log n) and a handle
/// from an already-delivered callback can never remove a newer one.
#[derive(Default)]
pub(crate) struct DelayQueue {
    entries: SlotMap<ScheduleHandle, Entry>,
    order: BTreeSet<(Millis, u64, ScheduleHandle)>,
    next_seq: u64,
}

impl DelayQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, deadline: Millis, callback: Callback) -> ScheduleHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let handle = self.entries.insert(Entry {
            deadline,
            seq,
            callback,
        });
        self.order.insert((deadline, seq, handle));
        handle
    }

    /// Removes a pending entry. Returns `false` if it was already delivered or cancelled.
    pub(crate) fn remove(&mut self, handle: ScheduleHandle) -> bool {
        match self.entries.remove(handle) {
            Some(entry) => {
                self.order.remove(&(entry.deadline, entry.seq, handle));
                true
            }
            None => false,
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Millis> {
        self.order.first().map(|(deadline, _, _)| *deadline)
    }

    /// Pops the earliest entry whose deadline is at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Millis) -> Option<(Millis, Callback)> {
        let &(deadline, seq, handle) = self.order.first()?;
        if deadline > now {
            return None;
        }
        self.order.remove(&(deadline, seq, handle));
        self.entries
            .remove(handle)
            .map(|entry| (entry.deadline, entry.callback))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Callback {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(label))
    }

    #[test]
    fn pops_in_deadline_then_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DelayQueue::new();
        queue.insert(30, recorder(&log, "late"));
        queue.insert(10, recorder(&log, "first"));
        queue.insert(10, recorder(&log, "second"));

        assert_eq!(queue.next_deadline(), Some(10));
        while let Some((_, callback)) = queue.pop_due(100) {
            callback();
        }
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "late"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn entries_beyond_now_stay_queued() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DelayQueue::new();
        queue.insert(50, recorder(&log, "later"));

        assert!(queue.pop_due(49).is_none());
        let (deadline, _) = queue.pop_due(50).expect("entry is due");
        assert_eq!(deadline, 50);
    }

    #[test]
    fn removed_handles_never_pop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DelayQueue::new();
        let handle = queue.insert(5, recorder(&log, "cancelled"));

        assert!(queue.remove(handle));
        assert!(!queue.remove(handle));
        assert!(queue.pop_due(1_000).is_none());
        assert_eq!(queue.next_deadline(), None);
    }
}
