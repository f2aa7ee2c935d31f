use std::sync::{Arc, Mutex, Weak};

use crate::{Result, StreamContext, StreamKind};

#[cfg(feature = "cuda")]
use crate::cuda_backend::AccelEvent;

/// A lightweight token recording "work up to this point" on the stream
/// that emitted it, used to order independent streams against each other.
///
/// CPU signals are metadata only, since a CPU stream's ordering is already
/// total. Accelerator signals carry a device event that
/// [`StreamContext::wait_signal`] enqueues waits against.
pub struct StreamSignal {
    kind: StreamKind,
    emitter: Mutex<Weak<StreamContext>>,
    #[cfg(feature = "cuda")]
    event: Option<AccelEvent>,
}

impl StreamSignal {
    /// Create a signal with no emitter.
    pub fn new(kind: StreamKind) -> Result<Self> {
        #[cfg(feature = "cuda")]
        let event = match kind {
            StreamKind::Cpu => None,
            StreamKind::Accelerator { ordinal } => Some(AccelEvent::new(ordinal)?),
        };
        Ok(StreamSignal {
            kind,
            emitter: Mutex::new(Weak::new()),
            #[cfg(feature = "cuda")]
            event,
        })
    }

    /// The device family this signal synchronizes.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// The stream that most recently emitted this signal, if it is still
    /// alive. Re-emitting overwrites the previous emitter.
    pub fn emitter(&self) -> Option<Arc<StreamContext>> {
        self.emitter.lock().unwrap().upgrade()
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn accel_event(&self) -> Option<&AccelEvent> {
        self.event.as_ref()
    }
}

impl StreamContext {
    /// Record this stream as `signal`'s emitter.
    ///
    /// Accelerator streams also enqueue a device-level event record at the
    /// stream's current tail; emitting on a CPU stream is metadata only.
    /// Only the latest emission is remembered.
    pub fn emit(self: &Arc<Self>, signal: &StreamSignal) -> Result<()> {
        assert_eq!(
            self.kind(),
            signal.kind(),
            "signal emitted on a stream of a different device kind"
        );
        *signal.emitter.lock().unwrap() = Arc::downgrade(self);
        #[cfg(feature = "cuda")]
        if let (Some(accel), Some(event)) = (self.accel(), signal.accel_event()) {
            accel.record_event(event)?;
        }
        Ok(())
    }

    /// Order this stream's subsequently enqueued work after the point
    /// `signal` recorded. A CPU signal needs no device wait, so this is a
    /// no-op for it.
    pub fn wait_signal(&self, signal: &StreamSignal) -> Result<()> {
        #[cfg(feature = "cuda")]
        if let Some(event) = signal.accel_event() {
            let Some(accel) = self.accel() else {
                panic!("a CPU stream cannot wait on an accelerator signal");
            };
            accel.wait_event(event)?;
        }
        #[cfg(not(feature = "cuda"))]
        let _ = signal;
        Ok(())
    }
}
