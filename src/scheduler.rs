//! Cooperative-task scheduler attached to a stream context.
//!
//! Tasks that suspend awaiting a stream's device work run here.
//! [`StreamContext::wait`](crate::StreamContext::wait) blocks on the idle
//! notification before synchronizing the device itself, unless the caller
//! is one of the scheduler's own tasks.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

thread_local! {
    // Address of the scheduler whose task the thread is currently running.
    static RUNNING_ON: Cell<usize> = const { Cell::new(0) };
}

/// Hosts the tasks spawned against one stream and reports when none are
/// in flight. Created lazily by
/// [`StreamContext::scheduler`](crate::StreamContext::scheduler).
pub struct Scheduler {
    active: Mutex<usize>,
    idle: Condvar,
}

impl Scheduler {
    pub(crate) fn new() -> Arc<Self> {
        debug!("creating stream scheduler");
        Arc::new(Scheduler {
            active: Mutex::new(0),
            idle: Condvar::new(),
        })
    }

    /// Run `task` on the worker pool, tracked by this scheduler until it
    /// returns.
    pub fn schedule(self: &Arc<Self>, task: impl FnOnce() + Send + 'static) {
        *self.active.lock().unwrap() += 1;
        let scheduler = Arc::clone(self);
        rayon::spawn(move || {
            let tag = Arc::as_ptr(&scheduler) as usize;
            let previous = RUNNING_ON.with(|cell| cell.replace(tag));
            task();
            RUNNING_ON.with(|cell| cell.set(previous));
            scheduler.finish_one();
        });
    }

    /// Whether the calling thread is currently executing one of this
    /// scheduler's tasks.
    pub fn is_current(&self) -> bool {
        RUNNING_ON.with(Cell::get) == self as *const Scheduler as usize
    }

    /// Number of tasks scheduled but not yet finished.
    pub fn active(&self) -> usize {
        *self.active.lock().unwrap()
    }

    /// Block until no task is in flight.
    pub fn wait_idle(&self) {
        let mut active = self.active.lock().unwrap();
        while *active > 0 {
            active = self.idle.wait(active).unwrap();
        }
    }

    fn finish_one(&self) {
        let mut active = self.active.lock().unwrap();
        *active -= 1;
        if *active == 0 {
            self.idle.notify_all();
        }
    }
}
