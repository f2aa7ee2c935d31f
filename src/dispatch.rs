//! Completion-callback dispatch.
//!
//! Accelerator completion is observed on a thread that must not issue new
//! device work, so user callbacks hop to the process-wide worker pool
//! before running. Callbacks that only touch host state can skip the hop.

/// How a completion callback reaches its executing thread.
#[derive(Clone, Copy)]
pub(crate) enum Dispatch {
    /// Run on whatever thread observes completion. Only for callbacks
    /// that touch host state exclusively.
    Sync,
    /// Hand off to the global worker pool before running.
    Worker,
}

pub(crate) fn run(dispatch: Dispatch, callback: impl FnOnce() + Send + 'static) {
    match dispatch {
        Dispatch::Sync => callback(),
        Dispatch::Worker => rayon::spawn(callback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn sync_runs_on_the_calling_thread() {
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();
        run(Dispatch::Sync, move || {
            tx.send(std::thread::current().id() == caller).unwrap();
        });
        assert!(rx.try_recv().unwrap());
    }

    #[test]
    fn worker_hops_off_the_calling_thread() {
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();
        run(Dispatch::Worker, move || {
            tx.send(std::thread::current().id() != caller).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
