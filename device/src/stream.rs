//! Streams and the per-runtime stream registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::ensure;
use tracing::debug;

use crate::backend::DeviceBackend;
use crate::error::{InvalidOrdinalSnafu, Result};

/// Whether a stream is the device's default queue or one we created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Default,
    Owned,
}

pub(crate) enum RawStream {
    Host { id: u64 },
    #[cfg(feature = "cuda")]
    Cuda { stream: Arc<cudarc::driver::CudaStream> },
}

/// An ordered work queue on one device.
///
/// Cheap to share as `Arc<Stream>`; registry callers compare identity with
/// `Arc::ptr_eq`.
pub struct Stream {
    pub(crate) device: usize,
    pub(crate) kind: StreamKind,
    pub(crate) raw: RawStream,
}

impl Stream {
    pub fn device(&self) -> usize {
        self.device
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn is_default(&self) -> bool {
        self.kind == StreamKind::Default
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("device", &self.device).field("kind", &self.kind).finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<Arc<Stream>>>>;

/// At most one cached non-default stream per device ordinal.
///
/// The map itself is lock-free, so lookups for different ordinals never
/// block each other; the per-ordinal slot mutex serializes racing creators
/// so the backend sees a single creation call per ordinal.
pub struct StreamRegistry {
    slots: papaya::HashMap<usize, Slot>,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self { slots: papaya::HashMap::new() }
    }

    /// Return the cached stream for `ordinal`, creating it on first use.
    ///
    /// A failed creation leaves the slot empty, so a later call retries
    /// instead of caching the failure.
    pub fn get_or_create(&self, backend: &dyn DeviceBackend, ordinal: usize) -> Result<Arc<Stream>> {
        let count = backend.device_count();
        ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });

        let slot = {
            let map = self.slots.pin();
            Arc::clone(map.get_or_insert_with(ordinal, Slot::default))
        };

        let mut slot = slot.lock();
        if let Some(stream) = slot.as_ref() {
            return Ok(Arc::clone(stream));
        }

        let stream = Arc::new(backend.create_stream(ordinal)?);
        debug!(ordinal, "created registry stream");
        *slot = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Cached stream for `ordinal`, if one exists. Never creates.
    pub fn cached(&self, ordinal: usize) -> Option<Arc<Stream>> {
        let map = self.slots.pin();
        map.get(&ordinal).and_then(|slot| slot.lock().clone())
    }
}
