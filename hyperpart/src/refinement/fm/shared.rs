use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::HypernodeId;
use crate::PartitionId;

/// One applied FM move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub node: HypernodeId,
    pub from: PartitionId,
    pub to: PartitionId,
    pub gain: i64,
}

pub type MoveId = usize;

/// Append-only log of applied moves.
///
/// Ids come from an atomic fetch-add, so they reflect a linear order across
/// all searches; slots are written once by the id owner before anyone else
/// learns the id. The only mutation after append is the `reverted` flag set
/// during rollback. When the preallocated capacity is exhausted, `append`
/// returns `None` and the caller winds down its search; that is a normal
/// terminal condition, not an error.
#[derive(Debug)]
pub struct MoveTracker {
    node: Vec<AtomicU32>,
    from: Vec<AtomicI32>,
    to: Vec<AtomicI32>,
    gain: Vec<AtomicI64>,
    reverted: Vec<AtomicBool>,
    next_id: AtomicUsize,
}

impl MoveTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            node: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            from: (0..capacity).map(|_| AtomicI32::new(0)).collect(),
            to: (0..capacity).map(|_| AtomicI32::new(0)).collect(),
            gain: (0..capacity).map(|_| AtomicI64::new(0)).collect(),
            reverted: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.node.len()
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, m: Move) -> Option<MoveId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id >= self.capacity() {
            return None;
        }
        self.node[id].store(m.node, Ordering::Relaxed);
        self.from[id].store(m.from, Ordering::Relaxed);
        self.to[id].store(m.to, Ordering::Relaxed);
        self.gain[id].store(m.gain, Ordering::Relaxed);
        self.reverted[id].store(false, Ordering::Relaxed);
        Some(id)
    }

    pub fn get(&self, id: MoveId) -> Move {
        Move {
            node: self.node[id].load(Ordering::Relaxed),
            from: self.from[id].load(Ordering::Relaxed),
            to: self.to[id].load(Ordering::Relaxed),
            gain: self.gain[id].load(Ordering::Relaxed),
        }
    }

    pub fn mark_reverted(&self, id: MoveId) {
        self.reverted[id].store(true, Ordering::Relaxed);
    }

    pub fn is_reverted(&self, id: MoveId) -> bool {
        self.reverted[id].load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.next_id.store(0, Ordering::Relaxed);
    }
}

/// State shared by every search of an FM round: the move log, per-vertex
/// search ownership tags and the finished-search accounting.
#[derive(Debug)]
pub struct SharedFmData {
    pub tracker: MoveTracker,
    /// 0 = unclaimed, otherwise `search id + 1`.
    search_of: Vec<AtomicU32>,
    pub finished_tasks: AtomicUsize,
    pub finished_tasks_limit: usize,
}

impl SharedFmData {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            tracker: MoveTracker::new(4 * num_nodes + 1024),
            search_of: (0..num_nodes).map(|_| AtomicU32::new(0)).collect(),
            finished_tasks: AtomicUsize::new(0),
            finished_tasks_limit: usize::MAX,
        }
    }

    /// Claim `v` for `search`; fails if any search (including this one)
    /// already holds it.
    pub fn try_claim(&self, v: HypernodeId, search: u32) -> bool {
        self.search_of[v as usize]
            .compare_exchange(0, search + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn owns(&self, v: HypernodeId, search: u32) -> bool {
        self.search_of[v as usize].load(Ordering::Relaxed) == search + 1
    }

    pub fn release(&self, v: HypernodeId) {
        self.search_of[v as usize].store(0, Ordering::Release);
    }

    /// Fresh round: forget ownership, truncate the log.
    pub fn reset(&mut self, finished_tasks_limit: usize) {
        for tag in &self.search_of {
            tag.store(0, Ordering::Relaxed);
        }
        self.tracker.reset();
        self.finished_tasks.store(0, Ordering::Relaxed);
        self.finished_tasks_limit = finished_tasks_limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_ids_are_monotonic_and_slots_survive() {
        let tracker = MoveTracker::new(8);
        let a = tracker
            .append(Move { node: 3, from: 0, to: 1, gain: 5 })
            .unwrap();
        let b = tracker
            .append(Move { node: 4, from: 1, to: 0, gain: -2 })
            .unwrap();
        assert!(a < b);
        assert_eq!(tracker.get(a).node, 3);
        assert_eq!(tracker.get(b).gain, -2);
        assert_eq!(tracker.len(), 2);

        tracker.mark_reverted(b);
        assert!(tracker.is_reverted(b));
        assert!(!tracker.is_reverted(a));
    }

    #[test]
    fn exhaustion_is_reported() {
        let tracker = MoveTracker::new(1);
        assert!(tracker
            .append(Move { node: 0, from: 0, to: 1, gain: 0 })
            .is_some());
        assert!(tracker
            .append(Move { node: 1, from: 0, to: 1, gain: 0 })
            .is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn claims_are_exclusive() {
        let shared = SharedFmData::new(4);
        assert!(shared.try_claim(2, 0));
        assert!(!shared.try_claim(2, 1));
        assert!(shared.owns(2, 0));
        assert!(!shared.owns(2, 1));

        shared.release(2);
        assert!(shared.try_claim(2, 1));
    }
}
