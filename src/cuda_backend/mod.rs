use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use cudarc::driver::{CudaContext, CudaEvent, CudaSlice};

use error::WrapErr;

use crate::dispatch::{self, Dispatch};
use crate::Result;

pub(crate) mod error;

/// One primary context per device ordinal, shared by every stream and
/// signal bound to that device.
fn contexts() -> &'static Mutex<HashMap<usize, Arc<CudaContext>>> {
    static CONTEXTS: OnceLock<Mutex<HashMap<usize, Arc<CudaContext>>>> = OnceLock::new();
    CONTEXTS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn context(ordinal: usize) -> Result<Arc<CudaContext>> {
    let mut contexts = contexts().lock().unwrap();
    if let Some(context) = contexts.get(&ordinal) {
        return Ok(Arc::clone(context));
    }
    let context = CudaContext::new(ordinal).w()?;
    contexts.insert(ordinal, Arc::clone(&context));
    Ok(context)
}

pub(crate) fn device_count() -> usize {
    cudarc::driver::result::device::get_count()
        .map(|count| count as usize)
        .unwrap_or(0)
}

/// Device-side plumbing for one accelerator stream.
pub(crate) struct AccelStream {
    context: Arc<CudaContext>,
    stream: Arc<cudarc::driver::CudaStream>,
    workspace: Mutex<Option<CudaSlice<u8>>>,
}

impl AccelStream {
    pub(crate) fn new(ordinal: usize) -> Result<Self> {
        let context = context(ordinal)?;
        let stream = context.new_stream().w()?;
        Ok(AccelStream {
            context,
            stream,
            workspace: Mutex::new(None),
        })
    }

    /// Record a fresh event at the stream's current tail.
    fn record(&self) -> Result<CudaEvent> {
        let event = self.context.new_event(None).w()?;
        event.record(&self.stream).w()?;
        Ok(event)
    }

    /// Record a signal's event at the stream's current tail. Re-recording
    /// moves the event forward; earlier emissions are forgotten.
    pub(crate) fn record_event(&self, event: &AccelEvent) -> Result<()> {
        event.0.record(&self.stream).w()
    }

    /// Make the stream's subsequently enqueued work wait for `event`.
    pub(crate) fn wait_event(&self, event: &AccelEvent) -> Result<()> {
        self.stream.wait(&event.0).w()
    }

    /// Blocking device-level synchronize of everything enqueued so far.
    pub(crate) fn synchronize(&self) -> Result<()> {
        self.stream.synchronize().w()
    }

    /// Observe completion of the currently enqueued work on a waiter
    /// thread, then run `callback` per `dispatch`.
    ///
    /// The driver forbids issuing device work from its own notification
    /// threads, so `Worker` dispatch hands user callbacks to the global
    /// pool first; `Sync` callbacks run on the waiter thread itself.
    pub(crate) fn notify(
        &self,
        dispatch: Dispatch,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let event = self.record()?;
        std::thread::spawn(move || {
            if event.synchronize().is_ok() {
                dispatch::run(dispatch, callback);
            }
        });
        Ok(())
    }

    /// Device-side scratch with the same grow-only policy as the host
    /// workspace: reuse while large enough, reallocate exactly-sized
    /// otherwise.
    pub(crate) fn device_workspace(&self, size: usize) -> Result<DeviceWorkspaceGuard<'_>> {
        let mut workspace = self.workspace.lock().unwrap();
        let grow = workspace.as_ref().map_or(true, |buffer| buffer.len() < size);
        if grow && size > 0 {
            *workspace = Some(unsafe { self.stream.alloc::<u8>(size) }.w()?);
        }
        Ok(DeviceWorkspaceGuard { workspace, len: size })
    }

    pub(crate) fn drain(&self) {
        *self.workspace.lock().unwrap() = None;
    }
}

/// Exclusive view of a stream's device workspace.
pub struct DeviceWorkspaceGuard<'a> {
    workspace: MutexGuard<'a, Option<CudaSlice<u8>>>,
    len: usize,
}

impl DeviceWorkspaceGuard<'_> {
    /// The underlying device allocation; at least `len` bytes. `None`
    /// only for zero-sized requests on a drained workspace.
    pub fn buffer(&self) -> Option<&CudaSlice<u8>> {
        self.workspace.as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Device event backing an accelerator signal.
pub(crate) struct AccelEvent(CudaEvent);

impl AccelEvent {
    pub(crate) fn new(ordinal: usize) -> Result<Self> {
        Ok(AccelEvent(context(ordinal)?.new_event(None).w()?))
    }
}
