/// Device family of a stream or signal.
///
/// The CPU is a single implicit device. Accelerators are addressed by
/// ordinal and only exist when the crate is built with the `cuda` feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Cpu,
    #[cfg(feature = "cuda")]
    Accelerator { ordinal: usize },
}

impl StreamKind {
    /// Whether this kind addresses an accelerator device.
    pub fn is_accelerator(&self) -> bool {
        match self {
            StreamKind::Cpu => false,
            #[cfg(feature = "cuda")]
            StreamKind::Accelerator { .. } => true,
        }
    }
}

/// Number of addressable devices of a family.
///
/// The CPU always counts as one device; accelerator counts come from the
/// driver.
pub fn device_count(kind: StreamKind) -> usize {
    match kind {
        StreamKind::Cpu => 1,
        #[cfg(feature = "cuda")]
        StreamKind::Accelerator { .. } => crate::cuda_backend::device_count(),
    }
}
