// src/monitor/queue.rs

//! Handoff of pending actions from the worker thread to the owning thread.
//!
//! The worker pushes each parsed batch with one lock acquisition; the owner
//! drains the whole backlog with one lock acquisition and then works on its
//! private list with the lock released.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::monitor::action::PendingAction;

#[derive(Debug, Default)]
struct Shared {
    actions: Mutex<VecDeque<PendingAction>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingAction>> {
        // The queue holds plain data; a panic elsewhere cannot leave it torn.
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker-side half.
#[derive(Debug, Clone)]
pub struct ActionSender {
    shared: Arc<Shared>,
}

/// Owner-side half.
#[derive(Debug)]
pub struct ActionReceiver {
    shared: Arc<Shared>,
}

pub fn action_queue() -> (ActionSender, ActionReceiver) {
    let shared = Arc::new(Shared::default());
    (
        ActionSender {
            shared: Arc::clone(&shared),
        },
        ActionReceiver { shared },
    )
}

impl ActionSender {
    /// Append a batch, preserving its order.
    pub fn push_batch(&self, batch: Vec<PendingAction>) {
        if batch.is_empty() {
            return;
        }
        self.shared.lock().extend(batch);
    }
}

impl ActionReceiver {
    /// Move every queued action to the end of `out`, oldest first. Returns the
    /// number moved.
    pub fn drain_into(&self, out: &mut Vec<PendingAction>) -> usize {
        let mut queue = self.shared.lock();
        let moved = queue.len();
        out.extend(queue.drain(..));
        moved
    }

    /// Actions handed off but not drained yet.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.shared.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::action::ActionKind;
    use std::path::PathBuf;
    use std::thread;

    fn action(entry: u64, name: &str) -> PendingAction {
        PendingAction::new(entry, ActionKind::Modified, PathBuf::from(name))
    }

    #[test]
    fn drains_in_fifo_order() {
        let (tx, rx) = action_queue();
        tx.push_batch(vec![action(1, "a"), action(1, "b")]);
        tx.push_batch(vec![action(2, "c")]);
        assert_eq!(rx.len(), 3);

        let mut out = vec![action(0, "carried")];
        assert_eq!(rx.drain_into(&mut out), 3);
        let names: Vec<_> = out.iter().map(|a| a.path.to_str().unwrap()).collect();
        assert_eq!(names, ["carried", "a", "b", "c"]);
        assert!(rx.is_empty());
    }

    #[test]
    fn batches_from_another_thread_arrive_whole() {
        let (tx, rx) = action_queue();
        let producer = thread::spawn(move || {
            for i in 0..50 {
                tx.push_batch(vec![action(i, "x"), action(i, "y")]);
            }
        });
        producer.join().unwrap();

        let mut out = Vec::new();
        rx.drain_into(&mut out);
        assert_eq!(out.len(), 100);
        for pair in out.chunks(2) {
            assert_eq!(pair[0].entry, pair[1].entry);
        }
    }
}
