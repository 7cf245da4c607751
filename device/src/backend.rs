//! Backend seam between resource accounting and real device memory.
//!
//! Resources deal in [`Slab`]s (contiguous reservations) and carve blocks
//! out of them; everything device-specific lives behind [`DeviceBackend`].
//! The host backend is always available and emulates a card closely enough
//! for the full surface to be testable without one: copies move real bytes
//! and a per-device capacity ledger makes out-of-memory paths reachable.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{InvalidOrdinalSnafu, OutOfDeviceMemorySnafu, Result};
use crate::stream::{RawStream, Stream, StreamKind};

#[cfg(feature = "cuda")]
use crate::error::{BackendSnafu, CudaSnafu};

/// One contiguous device reservation.
///
/// Freed when the last `Arc<Slab>` drops: the host ledger reservation and
/// the CUDA slice both release on drop.
#[derive(Debug)]
pub struct Slab {
    device: usize,
    len: usize,
    raw: RawSlab,
}

#[derive(Debug)]
enum RawSlab {
    Host {
        data: Mutex<Box<[u8]>>,
        _reservation: HostReservation,
    },
    #[cfg(feature = "cuda")]
    Cuda { data: Mutex<cudarc::driver::CudaSlice<u8>> },
}

impl Slab {
    pub fn device(&self) -> usize {
        self.device
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the slab at `offset`, ordered on `stream`.
    pub(crate) fn write_bytes(&self, offset: usize, src: &[u8], stream: &Stream) -> Result<()> {
        debug_assert!(offset + src.len() <= self.len);
        match (&self.raw, &stream.raw) {
            // Host copies are synchronous; the stream token is irrelevant.
            (RawSlab::Host { data, .. }, _) => {
                data.lock()[offset..offset + src.len()].copy_from_slice(src);
                Ok(())
            }
            #[cfg(feature = "cuda")]
            (RawSlab::Cuda { data }, RawStream::Cuda { stream }) => {
                use snafu::ResultExt;
                let mut slice = data.lock();
                let mut view = slice.slice_mut(offset..offset + src.len());
                stream.memcpy_htod(src, &mut view).context(CudaSnafu)
            }
            #[cfg(feature = "cuda")]
            (RawSlab::Cuda { .. }, RawStream::Host { .. }) => {
                BackendSnafu { reason: "stream and slab come from different backends" }.fail()
            }
        }
    }

    /// Copy slab contents at `offset` into `dst`, ordered on `stream`.
    pub(crate) fn read_bytes(&self, offset: usize, dst: &mut [u8], stream: &Stream) -> Result<()> {
        debug_assert!(offset + dst.len() <= self.len);
        match (&self.raw, &stream.raw) {
            (RawSlab::Host { data, .. }, _) => {
                dst.copy_from_slice(&data.lock()[offset..offset + dst.len()]);
                Ok(())
            }
            #[cfg(feature = "cuda")]
            (RawSlab::Cuda { data }, RawStream::Cuda { stream }) => {
                use snafu::ResultExt;
                let slice = data.lock();
                let view = slice.slice(offset..offset + dst.len());
                stream.memcpy_dtoh(&view, dst).context(CudaSnafu)
            }
            #[cfg(feature = "cuda")]
            (RawSlab::Cuda { .. }, RawStream::Host { .. }) => {
                BackendSnafu { reason: "stream and slab come from different backends" }.fail()
            }
        }
    }
}

pub trait DeviceBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn device_count(&self) -> usize;

    /// `(free, total)` bytes on the given device.
    fn memory_info(&self, ordinal: usize) -> Result<(usize, usize)>;

    /// The device's default queue. `ordinal` must be in range.
    fn default_stream(&self, ordinal: usize) -> Stream;

    /// Create a fresh non-default stream.
    fn create_stream(&self, ordinal: usize) -> Result<Stream>;

    /// Reserve `bytes` of device memory, zero-initialized.
    fn alloc_slab(&self, ordinal: usize, bytes: usize) -> Result<Slab>;

    /// Block until all work queued on `stream` has completed.
    fn synchronize(&self, stream: &Stream) -> Result<()>;
}

/// Per-device accounting for the host backend's emulated capacity.
#[derive(Debug)]
struct DeviceLedger {
    capacity: usize,
    used: Mutex<usize>,
}

impl DeviceLedger {
    fn reserve(self: &Arc<Self>, bytes: usize, ordinal: usize) -> Result<HostReservation> {
        let mut used = self.used.lock();
        let available = self.capacity - *used;
        ensure!(bytes <= available, OutOfDeviceMemorySnafu { requested: bytes, available, ordinal });
        *used += bytes;
        Ok(HostReservation { bytes, ledger: Arc::clone(self) })
    }
}

#[derive(Debug)]
struct HostReservation {
    bytes: usize,
    ledger: Arc<DeviceLedger>,
}

impl Drop for HostReservation {
    fn drop(&mut self) {
        *self.ledger.used.lock() -= self.bytes;
    }
}

/// Host-memory emulation of a device backend.
///
/// Memory really is allocated and copied, so transfer behavior matches the
/// CUDA path; the capacity ledger stands in for the card's VRAM. Streams
/// are tagged tokens and synchronization is a no-op.
#[derive(Debug)]
pub struct HostBackend {
    ledgers: Vec<Arc<DeviceLedger>>,
    next_stream_id: AtomicU64,
}

impl HostBackend {
    /// Emulated capacity per device unless [`HostBackend::with_layout`] says otherwise.
    pub const DEFAULT_CAPACITY: usize = 256 * 1024 * 1024;

    /// One device with the default capacity.
    pub fn new() -> Self {
        Self::with_layout(1, Self::DEFAULT_CAPACITY)
    }

    /// `devices` emulated devices with `capacity` bytes each.
    pub fn with_layout(devices: usize, capacity: usize) -> Self {
        let ledgers =
            (0..devices).map(|_| Arc::new(DeviceLedger { capacity, used: Mutex::new(0) })).collect();
        Self { ledgers, next_stream_id: AtomicU64::new(1) }
    }

    /// Bytes currently reserved on `ordinal`.
    pub fn used(&self, ordinal: usize) -> usize {
        *self.ledgers[ordinal].used.lock()
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn device_count(&self) -> usize {
        self.ledgers.len()
    }

    fn memory_info(&self, ordinal: usize) -> Result<(usize, usize)> {
        let count = self.ledgers.len();
        ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });
        let ledger = &self.ledgers[ordinal];
        let used = *ledger.used.lock();
        Ok((ledger.capacity - used, ledger.capacity))
    }

    fn default_stream(&self, ordinal: usize) -> Stream {
        debug_assert!(ordinal < self.ledgers.len());
        Stream { device: ordinal, kind: StreamKind::Default, raw: RawStream::Host { id: 0 } }
    }

    fn create_stream(&self, ordinal: usize) -> Result<Stream> {
        let count = self.ledgers.len();
        ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        Ok(Stream { device: ordinal, kind: StreamKind::Owned, raw: RawStream::Host { id } })
    }

    fn alloc_slab(&self, ordinal: usize, bytes: usize) -> Result<Slab> {
        let count = self.ledgers.len();
        ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });
        let reservation = self.ledgers[ordinal].reserve(bytes, ordinal)?;
        let data = vec![0u8; bytes].into_boxed_slice();
        Ok(Slab { device: ordinal, len: bytes, raw: RawSlab::Host { data: Mutex::new(data), _reservation: reservation } })
    }

    fn synchronize(&self, _stream: &Stream) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "cuda")]
pub mod cuda {
    use std::sync::Arc;

    use cudarc::driver::CudaContext;
    use parking_lot::Mutex;
    use snafu::{ResultExt, ensure};

    use super::{DeviceBackend, RawSlab, Slab};
    use crate::error::{BackendSnafu, CudaSnafu, InvalidOrdinalSnafu, Result};
    use crate::stream::{RawStream, Stream, StreamKind};

    /// CUDA backend over cudarc driver contexts, one per visible device.
    #[derive(Debug)]
    pub struct CudaBackend {
        contexts: Vec<Arc<CudaContext>>,
    }

    impl CudaBackend {
        pub fn new() -> Result<Self> {
            let count = CudaContext::device_count().context(CudaSnafu)? as usize;
            let mut contexts = Vec::with_capacity(count);
            for ordinal in 0..count {
                contexts.push(CudaContext::new(ordinal).context(CudaSnafu)?);
            }
            Ok(Self { contexts })
        }

        fn context(&self, ordinal: usize) -> Result<&Arc<CudaContext>> {
            let count = self.contexts.len();
            ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });
            Ok(&self.contexts[ordinal])
        }
    }

    impl DeviceBackend for CudaBackend {
        fn name(&self) -> &str {
            "CUDA"
        }

        fn device_count(&self) -> usize {
            self.contexts.len()
        }

        fn memory_info(&self, ordinal: usize) -> Result<(usize, usize)> {
            self.context(ordinal)?.bind_to_thread().context(CudaSnafu)?;
            cudarc::driver::result::mem_get_info().context(CudaSnafu)
        }

        fn default_stream(&self, ordinal: usize) -> Stream {
            let stream = self.contexts[ordinal].default_stream();
            Stream { device: ordinal, kind: StreamKind::Default, raw: RawStream::Cuda { stream } }
        }

        fn create_stream(&self, ordinal: usize) -> Result<Stream> {
            let stream = self.context(ordinal)?.new_stream().context(CudaSnafu)?;
            Ok(Stream { device: ordinal, kind: StreamKind::Owned, raw: RawStream::Cuda { stream } })
        }

        fn alloc_slab(&self, ordinal: usize, bytes: usize) -> Result<Slab> {
            let stream = self.context(ordinal)?.default_stream();
            let data = stream.alloc_zeros::<u8>(bytes).context(CudaSnafu)?;
            Ok(Slab { device: ordinal, len: bytes, raw: RawSlab::Cuda { data: Mutex::new(data) } })
        }

        fn synchronize(&self, stream: &Stream) -> Result<()> {
            match &stream.raw {
                RawStream::Cuda { stream } => stream.synchronize().context(CudaSnafu),
                RawStream::Host { .. } => {
                    BackendSnafu { reason: "host stream given to the CUDA backend" }.fail()
                }
            }
        }
    }
}
