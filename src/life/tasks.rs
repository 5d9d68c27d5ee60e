use std::collections::VecDeque;

use crate::core::timebase::Millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

#[derive(Clone, Debug)]
pub struct Task<C> {
    pub handle: TaskHandle,
    pub fire_at: Millis,
    pub cue: C,
}

/// Per-agent set of outstanding scheduled sub-events, kept sorted by fire time.
///
/// A task leaves the queue either by firing through [`TaskQueue::pop_due`] or by
/// cancellation; a cancelled task can never fire.
#[derive(Debug)]
pub struct TaskQueue<C> {
    next_id: u64,
    pending: VecDeque<Task<C>>,
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: VecDeque::new(),
        }
    }
}

impl<C> TaskQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_fire_at(&self) -> Option<Millis> {
        self.pending.front().map(|t| t.fire_at)
    }

    pub fn schedule(&mut self, fire_at: Millis, cue: C) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        let task = Task {
            handle,
            fire_at,
            cue,
        };

        // Equal fire times keep scheduling order.
        let push_back = matches!(
            self.pending.back(),
            Some(last) if last.fire_at <= fire_at
        );
        if push_back {
            self.pending.push_back(task);
        } else {
            let insert_at = self
                .pending
                .iter()
                .position(|existing| existing.fire_at > fire_at)
                .unwrap_or(self.pending.len());
            self.pending.insert(insert_at, task);
        }
        debug_assert!(self.is_sorted());
        handle
    }

    fn is_sorted(&self) -> bool {
        self.pending
            .iter()
            .zip(self.pending.iter().skip(1))
            .all(|(a, b)| a.fire_at <= b.fire_at)
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.handle != handle);
        self.pending.len() != before
    }

    /// Drop every outstanding task; returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<Task<C>> {
        match self.pending.front() {
            Some(t) if t.fire_at <= now => self.pending.pop_front(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_fire_order_with_stable_ties() {
        let mut q = TaskQueue::new();
        q.schedule(300, "c");
        q.schedule(100, "a");
        q.schedule(300, "d");
        q.schedule(100, "b");
        assert_eq!(q.next_fire_at(), Some(100));

        let mut fired = Vec::new();
        while let Some(t) = q.pop_due(1_000) {
            fired.push(t.cue);
        }
        assert_eq!(fired, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn pop_due_respects_now() {
        let mut q = TaskQueue::new();
        q.schedule(500, 1);
        assert!(q.pop_due(499).is_none());
        assert_eq!(q.pop_due(500).map(|t| t.cue), Some(1));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_single_and_all() {
        let mut q = TaskQueue::new();
        let a = q.schedule(10, 'a');
        q.schedule(20, 'b');
        q.schedule(30, 'c');
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert_eq!(q.cancel_all(), 2);
        assert!(q.pop_due(u64::MAX).is_none());
        assert_eq!(q.cancel_all(), 0);
    }
}
