use std::{collections::VecDeque, future::Future, os::fd::RawFd, pin::Pin, time::Instant};

use crate::config::ReadyPolicy;

/// A connection task: a pinned, non-`Send` future owned by exactly one
/// worker for its entire life. The future's state is the task's "stack".
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + 'static>>;

/// Direction a suspended task is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    Read,
    Write,
}

/// A task parked in the wait table: at most one per fd.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Parked {
    pub(crate) kind: WaitKind,
    /// When set, the worker bounds its notifier wait by this instant and
    /// wakes the task once it passes, so receive timeouts fire without a
    /// readiness event.
    pub(crate) deadline: Option<Instant>,
}

/// Per-worker queue of runnable tasks, identified by their connection fd.
///
/// Mutated only by the owning worker. Under FIFO a wakeup batch is appended
/// behind older entries; under LIFO the batch as a whole jumps the queue
/// while keeping its internal order.
pub(crate) struct ReadyQueue {
    queue: VecDeque<RawFd>,
    policy: ReadyPolicy,
}

impl ReadyQueue {
    pub(crate) fn new(policy: ReadyPolicy) -> Self {
        Self {
            queue: VecDeque::with_capacity(1024),
            policy,
        }
    }

    pub(crate) fn push_batch(&mut self, batch: Vec<RawFd>) {
        match self.policy {
            ReadyPolicy::Fifo => self.queue.extend(batch),
            ReadyPolicy::Lifo => {
                for fd in batch.into_iter().rev() {
                    self.queue.push_front(fd);
                }
            }
        }
    }

    pub(crate) fn pop(&mut self) -> Option<RawFd> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut ReadyQueue) -> Vec<RawFd> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn fifo_preserves_arrival_order_across_batches() {
        let mut queue = ReadyQueue::new(ReadyPolicy::Fifo);
        queue.push_batch(vec![3, 4, 5]);
        queue.push_batch(vec![6, 7]);
        assert_eq!(drain(&mut queue), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn lifo_runs_newest_batch_first_in_insertion_order() {
        let mut queue = ReadyQueue::new(ReadyPolicy::Lifo);
        queue.push_batch(vec![3, 4, 5]);
        queue.push_batch(vec![6, 7]);
        assert_eq!(drain(&mut queue), vec![6, 7, 3, 4, 5]);
    }
}
