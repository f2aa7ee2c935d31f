//! Pooled signals for the eager execution path.
//!
//! Eager dispatch synchronizes after every operation; allocating a fresh
//! signal each time would dominate the loop. Handlers instead cycle
//! between "in flight" and a per-stream free list, which bounds allocation
//! to the peak number of signals in flight per stream rather than the
//! total number of operations ever dispatched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::dispatch::Dispatch;
use crate::{Result, StreamContext, StreamSignal};

/// Reusable signal/handler pairs, keyed by stream identity.
#[derive(Default)]
pub struct SignalPool {
    containers: Mutex<HashMap<usize, Arc<SignalContainer>>>,
}

#[derive(Default)]
struct SignalContainer {
    free: Mutex<Vec<Arc<SignalHandler>>>,
}

/// Owns one pooled signal and knows the container it returns to. A
/// handler is either in flight or in the free list, never both.
struct SignalHandler {
    signal: Arc<StreamSignal>,
    container: Weak<SignalContainer>,
}

impl SignalPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a pooled signal on `stream` and return it.
    ///
    /// The handler behind the signal goes back on the free list once the
    /// stream's currently enqueued work completes, so callers must treat
    /// the signal as valid only for the synchronization point it was
    /// acquired for.
    pub fn acquire(&self, stream: &Arc<StreamContext>) -> Result<Arc<StreamSignal>> {
        let container = {
            let mut containers = self.containers.lock().unwrap();
            let key = Arc::as_ptr(stream) as usize;
            Arc::clone(containers.entry(key).or_default())
        };
        let handler = container.checkout(stream)?;
        stream.emit(&handler.signal)?;
        let recycled = Arc::clone(&handler);
        // The recycle callback touches host state only, so it may run
        // directly on the thread that observes completion.
        stream.add_callback_with(Dispatch::Sync, move || {
            if let Some(container) = recycled.container.upgrade() {
                container.free.lock().unwrap().push(Arc::clone(&recycled));
            }
        })?;
        Ok(Arc::clone(&handler.signal))
    }

    /// Drop every pooled handler and container. Signals still held by
    /// callers stay alive until those references drop.
    pub fn release_all(&self) {
        self.containers.lock().unwrap().clear();
    }
}

impl SignalContainer {
    /// Pop a free handler, or allocate one wrapping a new signal of the
    /// stream's kind. The mutex makes the free-to-in-flight transition
    /// atomic, so one handler can never be handed to two callers.
    fn checkout(self: &Arc<Self>, stream: &Arc<StreamContext>) -> Result<Arc<SignalHandler>> {
        let mut free = self.free.lock().unwrap();
        match free.pop() {
            Some(handler) => Ok(handler),
            None => {
                trace!("signal pool miss, allocating a handler");
                Ok(Arc::new(SignalHandler {
                    signal: Arc::new(StreamSignal::new(stream.kind())?),
                    container: Arc::downgrade(self),
                }))
            }
        }
    }
}
