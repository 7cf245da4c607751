//! The runtime object: backend, stream registry, active memory resource.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use snafu::ensure;
use tracing::debug;

use crate::backend::{DeviceBackend, HostBackend};
use crate::context::{ContextInner, ContextOptions, ExecutionContext};
use crate::error::{InvalidOrdinalSnafu, ResourceBusySnafu, Result, StreamAffinitySnafu};
use crate::resource::{
    ArenaResource, BinningResource, DeviceResource, DirectResource, PoolResource, ResourceDesc, ResourceHandle,
    ResourceKind,
};
use crate::stream::{Stream, StreamRegistry};

struct InstalledResource {
    id: u64,
    device: usize,
    resource: Arc<dyn DeviceResource>,
}

struct RuntimeInner {
    backend: Arc<dyn DeviceBackend>,
    streams: StreamRegistry,
    default_resource: Arc<DirectResource>,
    active: RwLock<Option<InstalledResource>>,
    next_handle: AtomicU64,
}

/// Entry point to the boundary layer.
///
/// Owns the backend, the stream registry and the active memory resource.
/// Construct one per process (or per test) instead of reaching for process
/// globals; clones share the same state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Runtime over the host-memory emulation backend.
    pub fn host() -> Self {
        Self::with_backend(Arc::new(HostBackend::new()))
    }

    /// Runtime over real CUDA devices.
    #[cfg(feature = "cuda")]
    pub fn cuda() -> Result<Self> {
        Ok(Self::with_backend(Arc::new(crate::backend::cuda::CudaBackend::new()?)))
    }

    pub fn with_backend(backend: Arc<dyn DeviceBackend>) -> Self {
        let default_resource = Arc::new(DirectResource::new(Arc::clone(&backend)));
        Self {
            inner: Arc::new(RuntimeInner {
                backend,
                streams: StreamRegistry::new(),
                default_resource,
                active: RwLock::new(None),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.inner.backend
    }

    pub fn device_count(&self) -> usize {
        self.inner.backend.device_count()
    }

    /// `(free, total)` bytes for `device`.
    pub fn memory_info(&self, device: usize) -> Result<(usize, usize)> {
        self.check_ordinal(device)?;
        self.inner.backend.memory_info(device)
    }

    fn check_ordinal(&self, ordinal: usize) -> Result<()> {
        let count = self.inner.backend.device_count();
        ensure!(ordinal < count, InvalidOrdinalSnafu { ordinal, count });
        Ok(())
    }

    /// The device's default queue.
    pub fn default_stream(&self, device: usize) -> Result<Arc<Stream>> {
        self.check_ordinal(device)?;
        Ok(Arc::new(self.inner.backend.default_stream(device)))
    }

    /// Cached non-default stream for `device`, created on first use.
    pub fn get_or_create_stream(&self, device: usize) -> Result<Arc<Stream>> {
        self.inner.streams.get_or_create(self.inner.backend.as_ref(), device)
    }

    pub fn stream_registry(&self) -> &StreamRegistry {
        &self.inner.streams
    }

    /// Install `desc` as the active resource for `device`.
    ///
    /// Contexts bind to whatever is active when they are created; already
    /// existing contexts keep the resource they captured.
    pub fn install_resource(&self, device: usize, desc: ResourceDesc) -> Result<ResourceHandle> {
        self.check_ordinal(device)?;
        desc.validate()?;

        let backend = Arc::clone(&self.inner.backend);
        let resource: Arc<dyn DeviceResource> = match desc {
            ResourceDesc::Pool { initial_size, max_size } => {
                Arc::new(PoolResource::new(backend, device, initial_size, max_size)?)
            }
            ResourceDesc::Binning { min_exponent, max_exponent } => {
                Arc::new(BinningResource::new(backend, device, min_exponent, max_exponent))
            }
            ResourceDesc::Arena { region_size } => {
                let region = match region_size {
                    Some(size) => size,
                    None => self.inner.backend.memory_info(device)?.0 / 2,
                };
                Arc::new(ArenaResource::new(backend, device, region)?)
            }
        };

        let id = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        debug!(device, id, kind = ?resource.kind(), "installed memory resource");
        *self.inner.active.write() = Some(InstalledResource { id, device, resource: Arc::clone(&resource) });
        Ok(ResourceHandle { id, resource })
    }

    pub fn install_pool(&self, device: usize, initial_size: usize, max_size: usize) -> Result<ResourceHandle> {
        self.install_resource(device, ResourceDesc::Pool { initial_size, max_size })
    }

    pub fn install_binning(&self, device: usize, min_exponent: u32, max_exponent: u32) -> Result<ResourceHandle> {
        self.install_resource(device, ResourceDesc::Binning { min_exponent, max_exponent })
    }

    pub fn install_arena(&self, device: usize, region_size: Option<usize>) -> Result<ResourceHandle> {
        self.install_resource(device, ResourceDesc::Arena { region_size })
    }

    /// Restore the default direct path.
    ///
    /// Refuses while the resource still backs live allocations; release the
    /// buffers and call again. Resetting a handle that is no longer active
    /// just tears it down.
    pub fn reset_resource(&self, handle: &ResourceHandle) -> Result<()> {
        let mut active = self.inner.active.write();
        let outstanding = handle.resource.outstanding();
        ensure!(outstanding == 0, ResourceBusySnafu { outstanding });

        if active.as_ref().is_some_and(|installed| installed.id == handle.id) {
            *active = None;
            debug!(id = handle.id, "reset memory resource to default");
        }
        Ok(())
    }

    pub fn active_resource_kind(&self) -> ResourceKind {
        self.inner.active.read().as_ref().map(|installed| installed.resource.kind()).unwrap_or(ResourceKind::Direct)
    }

    /// Context on device 0 with the registry stream.
    pub fn create_context(&self) -> Result<ExecutionContext> {
        self.create_context_with(ContextOptions::default())
    }

    /// Atomic: either a fully initialized context or an error, never a
    /// partially constructed one.
    pub fn create_context_with(&self, options: ContextOptions) -> Result<ExecutionContext> {
        self.check_ordinal(options.device)?;

        let stream = match options.stream {
            Some(stream) => {
                ensure!(
                    stream.device() == options.device,
                    StreamAffinitySnafu { stream_device: stream.device(), handle_device: options.device }
                );
                stream
            }
            None => self.get_or_create_stream(options.device)?,
        };

        let resource: Arc<dyn DeviceResource> = {
            let active = self.inner.active.read();
            match active.as_ref() {
                Some(installed) if installed.device == options.device => Arc::clone(&installed.resource),
                _ => self.default_resource(),
            }
        };

        debug!(device = options.device, "created execution context");
        Ok(ExecutionContext::new(ContextInner {
            device: options.device,
            stream,
            resource: Arc::downgrade(&resource),
            fallback: self.default_resource(),
            backend: Arc::clone(&self.inner.backend),
        }))
    }

    fn default_resource(&self) -> Arc<dyn DeviceResource> {
        Arc::clone(&self.inner.default_resource) as Arc<dyn DeviceResource>
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("backend", &self.inner.backend.name())
            .field("devices", &self.device_count())
            .field("active_resource", &self.active_resource_kind())
            .finish()
    }
}
