//! Virtual-clock task scheduler
//!
//! The engine never sleeps. Delayed work (debounce, polling, swap and
//! settle delays, reveal scans) is queued here with a due time in
//! milliseconds, and the host releases it by advancing the clock.

use graft_dom::NodeId;

use crate::exchange::ExchangeId;

/// Handle for cancelling a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// Deferred engine work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// A delayed trigger firing (delay modifier elapsed)
    DebounceFire { element: NodeId, spec: usize },
    /// A periodic poll tick
    Poll { element: NodeId, spec: usize },
    /// A load trigger deferred by a delay modifier
    LoadFire { element: NodeId, spec: usize },
    /// Periodic viewport check for reveal/intersect triggers
    RevealScan,
    /// A swap held back by a swap delay modifier
    ApplySwap { exchange: ExchangeId },
    /// End of the settle window for a completed swap
    Settle { exchange: ExchangeId },
}

#[derive(Debug)]
struct Entry {
    id: TaskId,
    due: u64,
    seq: u64,
    task: Task,
}

/// Pending tasks ordered by due time, then by scheduling order
#[derive(Debug, Default)]
pub struct Scheduler {
    now: u64,
    next_id: u64,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Queue a task `delay_ms` from now
    pub fn schedule(&mut self, delay_ms: u64, task: Task) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        tracing::trace!(target: "graft", task = ?task, delay_ms, "task scheduled");
        self.entries.push(Entry {
            id,
            due: self.now.saturating_add(delay_ms),
            seq: id.0,
            task,
        });
        id
    }

    /// Drop a pending task; a no-op if it already ran or was cancelled
    pub fn cancel(&mut self, id: TaskId) {
        self.entries.retain(|e| e.id != id);
    }

    /// Move the clock forward and take every task now due, in order
    pub fn advance(&mut self, now_ms: u64) -> Vec<Task> {
        if now_ms > self.now {
            self.now = now_ms;
        }
        let now = self.now;
        let mut due: Vec<Entry> = Vec::new();
        self.entries.retain(|e| {
            if e.due <= now {
                due.push(Entry {
                    id: e.id,
                    due: e.due,
                    seq: e.seq,
                    task: e.task.clone(),
                });
                false
            } else {
                true
            }
        });
        due.sort_by_key(|e| (e.due, e.seq));
        due.into_iter().map(|e| e.task).collect()
    }

    /// Whether a task is still pending
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_order() {
        let mut sched = Scheduler::new();
        sched.schedule(20, Task::RevealScan);
        sched.schedule(10, Task::Settle { exchange: ExchangeId(1) });
        sched.schedule(10, Task::Settle { exchange: ExchangeId(2) });

        assert!(sched.advance(5).is_empty());
        let due = sched.advance(20);
        assert_eq!(
            due,
            vec![
                Task::Settle { exchange: ExchangeId(1) },
                Task::Settle { exchange: ExchangeId(2) },
                Task::RevealScan,
            ]
        );
    }

    #[test]
    fn test_cancel() {
        let mut sched = Scheduler::new();
        let id = sched.schedule(5, Task::RevealScan);
        assert!(sched.is_pending(id));
        sched.cancel(id);
        assert!(!sched.is_pending(id));
        assert!(sched.advance(10).is_empty());
    }

    #[test]
    fn test_clock_never_rewinds() {
        let mut sched = Scheduler::new();
        sched.advance(100);
        sched.advance(50);
        assert_eq!(sched.now(), 100);
    }
}
