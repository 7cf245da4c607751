//! Execution contexts: device + stream + memory-resource binding.

use std::fmt;
use std::sync::{Arc, Weak};

use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::backend::DeviceBackend;
use crate::error::{HandleFreedSnafu, Result, StreamAffinitySnafu};
use crate::resource::DeviceResource;
use crate::stream::Stream;

/// Options for [`crate::Runtime::create_context_with`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Device ordinal; defaults to 0.
    pub device: usize,
    /// Explicit stream. When absent the registry stream for the ordinal is
    /// used, created on demand.
    pub stream: Option<Arc<Stream>>,
}

pub(crate) struct ContextInner {
    pub(crate) device: usize,
    pub(crate) stream: Arc<Stream>,
    pub(crate) resource: Weak<dyn DeviceResource>,
    pub(crate) fallback: Arc<dyn DeviceResource>,
    pub(crate) backend: Arc<dyn DeviceBackend>,
}

/// Per-caller execution state: one device, one current stream, and the
/// memory resource captured when the context was created.
///
/// The device ordinal is fixed for the context's lifetime; the stream can
/// be swapped as long as it stays on that device. Contexts are not
/// internally synchronized against concurrent mutation; one logical caller
/// at a time.
pub struct ExecutionContext {
    inner: Option<ContextInner>,
}

impl ExecutionContext {
    pub(crate) fn new(inner: ContextInner) -> Self {
        Self { inner: Some(inner) }
    }

    fn inner(&self) -> Result<&ContextInner> {
        self.inner.as_ref().context(HandleFreedSnafu { handle: "execution context" })
    }

    pub fn device(&self) -> Result<usize> {
        Ok(self.inner()?.device)
    }

    pub fn stream(&self) -> Result<&Arc<Stream>> {
        Ok(&self.inner()?.stream)
    }

    /// Swap the current stream. The new stream must live on this context's
    /// device.
    pub fn set_stream(&mut self, stream: Arc<Stream>) -> Result<()> {
        let inner = self.inner.as_mut().context(HandleFreedSnafu { handle: "execution context" })?;
        ensure!(
            stream.device() == inner.device,
            StreamAffinitySnafu { stream_device: stream.device(), handle_device: inner.device }
        );
        inner.stream = stream;
        Ok(())
    }

    /// Memory resource for new allocations under this context.
    ///
    /// Falls back to the runtime's direct path when the captured resource
    /// has been reset since.
    pub fn resource(&self) -> Result<Arc<dyn DeviceResource>> {
        let inner = self.inner()?;
        Ok(inner.resource.upgrade().unwrap_or_else(|| Arc::clone(&inner.fallback)))
    }

    pub(crate) fn backend(&self) -> Result<&Arc<dyn DeviceBackend>> {
        Ok(&self.inner()?.backend)
    }

    pub fn is_freed(&self) -> bool {
        self.inner.is_none()
    }

    /// Tear the context down. A second call reports misuse instead of
    /// succeeding silently.
    pub fn free(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(inner) => {
                debug!(device = inner.device, "freed execution context");
                Ok(())
            }
            None => HandleFreedSnafu { handle: "execution context" }.fail(),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("ExecutionContext")
                .field("device", &inner.device)
                .field("stream", &inner.stream)
                .finish_non_exhaustive(),
            None => f.write_str("ExecutionContext(freed)"),
        }
    }
}
