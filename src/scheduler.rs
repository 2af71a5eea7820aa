//! Deferred task queue.
//!
//! The scope engine never spawns threads or timers itself. Work that must
//! run "later" (coalesced [`apply_async`](crate::scope::Scope::apply_async)
//! flushes, overflow digests after [`eval_async`](crate::scope::Scope::eval_async)
//! outside a digest) is handed to a [`Scheduler`], and the embedding host
//! drains it whenever its own event loop is idle, via [`Scheduler::run_next`]
//! or [`Scheduler::run_all`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

type Task = Box<dyn FnOnce()>;

struct Slot {
    id: TaskId,
    task: Task,
}

/// FIFO queue of host-drained deferred tasks.
///
/// Cheaply cloneable; clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    queue: Rc<RefCell<Vec<Slot>>>,
    next_id: Rc<Cell<u64>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: Rc::new(RefCell::new(Vec::new())),
            next_id: Rc::new(Cell::new(0)),
        }
    }

    /// Enqueues `task` and returns a handle that [`cancel`](Self::cancel)
    /// accepts.
    pub fn schedule(&self, task: impl FnOnce() + 'static) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.queue.borrow_mut().push(Slot {
            id,
            task: Box::new(task),
        });
        id
    }

    /// Removes a not-yet-run task. Returns whether it was still pending.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|slot| slot.id != id);
        queue.len() != before
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the oldest pending task. Returns `false` if the queue was empty.
    ///
    /// The task is popped before it runs, so a task that schedules more work
    /// never observes itself as pending.
    pub fn run_next(&self) -> bool {
        let slot = {
            let mut queue = self.queue.borrow_mut();
            if queue.is_empty() {
                return false;
            }
            queue.remove(0)
        };
        (slot.task)();
        true
    }

    /// Drains the queue, including tasks scheduled by the tasks themselves.
    pub fn run_all(&self) {
        while self.run_next() {}
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_fifo_order() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            scheduler.schedule(move || order.borrow_mut().push(n));
        }
        scheduler.run_all();

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_flag = ran.clone();
        let id = scheduler.schedule(move || ran_flag.set(true));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        scheduler.run_all();
        assert!(!ran.get());
    }
}
