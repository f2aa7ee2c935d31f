//! Tensorlane is the stream, signal, and scheduling core for a
//! heterogeneous tensor runtime.
//!
//! A [`StreamContext`] is one logical execution lane on a device: work
//! enqueued on it runs in submission order, and independent lanes are
//! ordered against each other only through explicit [`StreamSignal`]
//! emit/wait pairs. The context also owns what a kernel dispatcher leans
//! on in its hot loop: grow-only scratch memory, teardown hooks tied to
//! the stream's lifetime, completion callbacks, and a lazily created
//! cooperative-task scheduler.
//!
//! Accelerator support is compiled in with the `cuda` feature; completion
//! callbacks for accelerator streams always reach user code on an
//! application-owned worker thread, never on a driver-owned one.
//!
//! ## A quick tour
//! ```
//! use tensorlane::{SignalPool, StreamContext, StreamKind};
//!
//! let stream = StreamContext::new(StreamKind::Cpu).unwrap();
//!
//! // Scratch memory is reused while it stays large enough.
//! {
//!     let mut scratch = stream.workspace(1024);
//!     scratch[0] = 1;
//! }
//!
//! // Teardown hooks run when the context is freed.
//! let hook = stream.add_hook(|_| {});
//! stream.remove_hook(hook);
//!
//! // The eager path borrows pooled signals instead of allocating.
//! let pool = SignalPool::new();
//! let signal = pool.acquire(&stream).unwrap();
//! assert!(signal.emitter().is_some());
//!
//! stream.wait().unwrap();
//! ```

#[cfg(feature = "cuda")]
mod cuda_backend;
mod device;
mod dispatch;
mod error;
mod pool;
mod scheduler;
mod signal;
mod stream;

#[cfg(feature = "cuda")]
pub use cuda_backend::DeviceWorkspaceGuard;
pub use device::{device_count, StreamKind};
pub use error::{Context, Error, Result};
pub use pool::SignalPool;
pub use scheduler::Scheduler;
pub use signal::StreamSignal;
pub use stream::{add_callback, wait, StreamContext, WorkspaceGuard};
