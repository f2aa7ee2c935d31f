use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::trace;

use crate::dispatch::Dispatch;
use crate::scheduler::Scheduler;
use crate::{Result, StreamKind};

#[cfg(feature = "cuda")]
use crate::cuda_backend::AccelStream;

/// Minimum alignment of host workspace buffers.
const WORKSPACE_ALIGN: usize = 16;

type HookFn = Box<dyn FnOnce(&StreamContext) + Send>;
type NeighborResolver = Arc<dyn Fn(usize) -> Option<Arc<StreamContext>> + Send + Sync>;

/// One logical execution lane on a device.
///
/// Work enqueued on a stream runs in submission order. A context owns the
/// scratch workspace kernels borrow, teardown hooks tied to the stream's
/// lifetime, an optional cooperative-task scheduler, and an optional
/// resolver for peer streams. The workspace is single-writer by contract;
/// the hook registry is safe to mutate from any thread.
pub struct StreamContext {
    kind: StreamKind,
    workspace: Mutex<Workspace>,
    hooks: Mutex<HookRegistry>,
    scheduler: OnceLock<Arc<Scheduler>>,
    neighbor: Mutex<Option<NeighborResolver>>,
    #[cfg(feature = "cuda")]
    accel: Option<AccelStream>,
}

impl StreamContext {
    /// Create a context for one execution lane of the given kind.
    pub fn new(kind: StreamKind) -> Result<Arc<Self>> {
        #[cfg(feature = "cuda")]
        let accel = match kind {
            StreamKind::Cpu => None,
            StreamKind::Accelerator { ordinal } => Some(AccelStream::new(ordinal)?),
        };
        trace!(?kind, "creating stream context");
        Ok(Arc::new(StreamContext {
            kind,
            workspace: Mutex::new(Workspace::empty()),
            hooks: Mutex::new(HookRegistry::default()),
            scheduler: OnceLock::new(),
            neighbor: Mutex::new(None),
            #[cfg(feature = "cuda")]
            accel,
        }))
    }

    /// The device family this context was created for. Never changes.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// The calling thread's default CPU context.
    ///
    /// Call sites that do not thread an explicit stream through fall back
    /// to this one. It is created lazily and lives until the thread exits;
    /// each thread gets its own.
    pub fn for_thread() -> Arc<Self> {
        thread_local! {
            static THREAD_CPU: Arc<StreamContext> =
                StreamContext::new(StreamKind::Cpu).expect("CPU context creation cannot fail");
        }
        THREAD_CPU.with(Arc::clone)
    }

    /// Host scratch memory of at least `size` bytes, 16-byte aligned.
    ///
    /// The same allocation is handed back until a larger size is requested
    /// or [`drain`](Self::drain) is called; it never shrinks on its own.
    /// Release the guard before calling `drain` from the same thread.
    pub fn workspace(&self, size: usize) -> WorkspaceGuard<'_> {
        let mut ws = self.workspace.lock().unwrap();
        ws.request(size);
        WorkspaceGuard { ws, len: size }
    }

    /// Release the workspace and reset its capacity to zero, so the next
    /// request allocates fresh. Meant for phase boundaries with very
    /// different scratch requirements.
    pub fn drain(&self) {
        trace!("draining stream workspace");
        self.workspace.lock().unwrap().release();
        #[cfg(feature = "cuda")]
        if let Some(accel) = &self.accel {
            accel.drain();
        }
    }

    /// Device-side scratch with the same grow-only policy as the host
    /// workspace. Only valid on accelerator streams.
    #[cfg(feature = "cuda")]
    pub fn device_workspace(&self, size: usize) -> Result<crate::DeviceWorkspaceGuard<'_>> {
        let Some(accel) = &self.accel else {
            panic!("device workspace requested on a CPU stream");
        };
        accel.device_workspace(size)
    }

    /// Register a teardown callback, run when this context is freed.
    ///
    /// The returned id stays stable until the hook is removed; removal of
    /// other hooks never renumbers it.
    pub fn add_hook(&self, hook: impl FnOnce(&StreamContext) + Send + 'static) -> usize {
        self.hooks.lock().unwrap().add(Box::new(hook))
    }

    /// Remove a previously registered hook.
    ///
    /// Panics if `id` lies outside the registry's current length; an
    /// unknown id is a caller bug, not a recoverable condition.
    pub fn remove_hook(&self, id: usize) {
        let mut hooks = self.hooks.lock().unwrap();
        if id >= hooks.slots.len() {
            let len = hooks.slots.len();
            drop(hooks);
            panic!("hook id {id} out of range for registry of length {len}");
        }
        hooks.remove(id);
    }

    /// The cooperative-task scheduler attached to this stream, created on
    /// first use and shared by every task that suspends on this stream.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        self.scheduler.get_or_init(Scheduler::new)
    }

    /// Install the resolver used by [`find_neighbor`](Self::find_neighbor).
    /// Installing a second resolver replaces the first.
    pub fn set_neighbor_discovery(
        &self,
        resolver: impl Fn(usize) -> Option<Arc<StreamContext>> + Send + Sync + 'static,
    ) {
        *self.neighbor.lock().unwrap() = Some(Arc::new(resolver));
    }

    /// Resolve the peer context for `device_id`, if a resolver is
    /// installed. Resolution happens on every call; nothing is cached, so
    /// the resolver can model a topology that changes over time.
    pub fn find_neighbor(&self, device_id: usize) -> Option<Arc<StreamContext>> {
        let resolver = self.neighbor.lock().unwrap().clone()?;
        resolver(device_id)
    }

    /// Run `callback` once all work currently enqueued on this stream has
    /// completed.
    ///
    /// On a CPU stream the enqueued work is already complete by the time
    /// this call executes in order, so the callback runs inline. On an
    /// accelerator stream the callback is handed to an application-owned
    /// worker before it runs, so it may safely enqueue new device work.
    pub fn add_callback(&self, callback: impl FnOnce() + Send + 'static) -> Result<()> {
        self.add_callback_with(Dispatch::Worker, callback)
    }

    pub(crate) fn add_callback_with(
        &self,
        dispatch: Dispatch,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        #[cfg(feature = "cuda")]
        if let Some(accel) = &self.accel {
            return accel.notify(dispatch, callback);
        }
        #[cfg(not(feature = "cuda"))]
        let _ = dispatch;
        // CPU work completes in submission order, so nothing is pending.
        callback();
        Ok(())
    }

    /// Block until all work enqueued on this stream has completed.
    ///
    /// If a scheduler was created for this stream and the caller is not
    /// one of its tasks, first waits for the scheduler to go idle; a task
    /// waiting on its own stream skips that phase so it cannot deadlock on
    /// itself. Accelerator streams then synchronize at the device level;
    /// for CPU streams submission order already implies completion.
    pub fn wait(&self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.get() {
            if !scheduler.is_current() {
                scheduler.wait_idle();
            }
        }
        #[cfg(feature = "cuda")]
        if let Some(accel) = &self.accel {
            accel.synchronize()?;
        }
        Ok(())
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn accel(&self) -> Option<&AccelStream> {
        self.accel.as_ref()
    }
}

impl Drop for StreamContext {
    fn drop(&mut self) {
        trace!(kind = ?self.kind, "freeing stream context");
        let hooks = std::mem::take(self.hooks.get_mut().unwrap_or_else(PoisonError::into_inner));
        for hook in hooks.slots.into_iter().flatten() {
            hook(self);
        }
    }
}

/// Wait on a stream that may be absent. An absent stream has nothing to
/// wait for, so `None` returns immediately.
pub fn wait(stream: Option<&StreamContext>) -> Result<()> {
    match stream {
        Some(stream) => stream.wait(),
        None => Ok(()),
    }
}

/// Completion callback on a stream that may be absent. With no stream
/// there is no pending work, so the callback runs inline.
pub fn add_callback(
    stream: Option<&StreamContext>,
    callback: impl FnOnce() + Send + 'static,
) -> Result<()> {
    match stream {
        Some(stream) => stream.add_callback(callback),
        None => {
            callback();
            Ok(())
        }
    }
}

struct Workspace {
    ptr: *mut u8,
    capacity: usize,
}

// The buffer is uniquely owned; the mutex around the workspace provides
// the synchronization.
unsafe impl Send for Workspace {}

impl Workspace {
    fn empty() -> Self {
        Workspace {
            ptr: std::ptr::null_mut(),
            capacity: 0,
        }
    }

    fn layout(capacity: usize) -> Layout {
        Layout::from_size_align(capacity, WORKSPACE_ALIGN).expect("workspace size overflows")
    }

    /// Grow-only: anything at or below the current capacity reuses the
    /// existing allocation untouched. A larger request frees the old
    /// buffer and allocates exactly the requested size, zeroed so guards
    /// always hand out initialized bytes.
    fn request(&mut self, size: usize) {
        if self.capacity >= size {
            return;
        }
        self.release();
        let layout = Self::layout(size);
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        self.ptr = ptr;
        self.capacity = size;
    }

    fn release(&mut self) {
        if !self.ptr.is_null() {
            unsafe { dealloc(self.ptr, Self::layout(self.capacity)) };
            self.ptr = std::ptr::null_mut();
            self.capacity = 0;
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusive view of a stream's host workspace, sized to the request that
/// produced it.
pub struct WorkspaceGuard<'a> {
    ws: MutexGuard<'a, Workspace>,
    len: usize,
}

impl WorkspaceGuard<'_> {
    /// Pointer identity is stable across requests that do not grow the
    /// buffer.
    pub fn as_ptr(&self) -> *const u8 {
        self.ws.ptr
    }
}

impl Deref for WorkspaceGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ws.ptr, self.len) }
    }
}

impl DerefMut for WorkspaceGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ws.ptr, self.len) }
    }
}

/// Sparse registry of teardown hooks: a growable vector of optional
/// entries plus a cursor to the earliest free slot. Removal punches a
/// hole instead of compacting, which keeps every live id stable; only
/// trailing holes are trimmed.
#[derive(Default)]
struct HookRegistry {
    slots: Vec<Option<HookFn>>,
    reuse: Option<usize>,
}

impl HookRegistry {
    fn add(&mut self, hook: HookFn) -> usize {
        match self.reuse.take() {
            Some(slot) => {
                self.slots[slot] = Some(hook);
                // The next hole after the slot just filled becomes the new
                // cursor.
                self.reuse = self.slots[slot + 1..]
                    .iter()
                    .position(Option::is_none)
                    .map(|offset| slot + 1 + offset);
                slot
            }
            None => {
                self.slots.push(Some(hook));
                self.slots.len() - 1
            }
        }
    }

    fn remove(&mut self, id: usize) {
        self.slots[id] = None;
        if let Some(last) = self.slots.iter().rposition(Option::is_some) {
            self.slots.truncate(last + 1);
        }
        if id < self.slots.len() && self.reuse.map_or(true, |reuse| id < reuse) {
            self.reuse = Some(id);
        } else if self.reuse.is_some_and(|reuse| reuse >= self.slots.len()) {
            self.reuse = None;
        }
    }
}
