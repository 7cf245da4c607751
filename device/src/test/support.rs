//! Shared fixtures for the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{DeviceBackend, HostBackend, Slab};
use crate::error::{Result, StreamCreationSnafu};
use crate::stream::Stream;

/// Host backend whose first `failures` stream creations fail.
///
/// Everything else delegates to the wrapped [`HostBackend`].
#[derive(Debug)]
pub struct FlakyStreams {
    inner: HostBackend,
    failures: AtomicUsize,
}

impl FlakyStreams {
    pub fn new(failures: usize) -> Self {
        Self { inner: HostBackend::new(), failures: AtomicUsize::new(failures) }
    }
}

impl DeviceBackend for FlakyStreams {
    fn name(&self) -> &str {
        "flaky-host"
    }

    fn device_count(&self) -> usize {
        self.inner.device_count()
    }

    fn memory_info(&self, ordinal: usize) -> Result<(usize, usize)> {
        self.inner.memory_info(ordinal)
    }

    fn default_stream(&self, ordinal: usize) -> Stream {
        self.inner.default_stream(ordinal)
    }

    fn create_stream(&self, ordinal: usize) -> Result<Stream> {
        let remaining = self.failures.load(Ordering::Acquire);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::Release);
            return StreamCreationSnafu { ordinal, reason: "injected failure" }.fail();
        }
        self.inner.create_stream(ordinal)
    }

    fn alloc_slab(&self, ordinal: usize, bytes: usize) -> Result<Slab> {
        self.inner.alloc_slab(ordinal, bytes)
    }

    fn synchronize(&self, stream: &Stream) -> Result<()> {
        self.inner.synchronize(stream)
    }
}
