//! Typed device buffers.

use std::sync::Arc;

use snafu::{OptionExt, ensure};

use crate::backend::DeviceBackend;
use crate::context::ExecutionContext;
use crate::element::{Element, ElementType};
use crate::error::{ElementMismatchSnafu, HandleFreedSnafu, Result, SizeMismatchSnafu};
use crate::resource::{Block, DeviceResource};
use crate::stream::Stream;

#[derive(Debug)]
struct BufferState {
    /// `None` for zero-length buffers; they never touch the backend.
    block: Option<Block>,
    resource: Arc<dyn DeviceResource>,
    stream: Arc<Stream>,
    backend: Arc<dyn DeviceBackend>,
}

/// A device-resident array with an element-type tag.
///
/// The buffer remembers the stream and memory resource it was allocated
/// under: transfers ride that stream and the free routes back to that
/// resource, regardless of what is active when they happen. Transfers
/// block until the copy has completed.
#[derive(Debug)]
pub struct DeviceBuffer {
    state: Option<BufferState>,
    element: ElementType,
    len: usize,
}

impl DeviceBuffer {
    /// Allocate under `ctx`'s resource and copy `host` to the device.
    ///
    /// Zero-length slices produce a valid empty buffer without touching the
    /// backend.
    pub fn from_slice<T: Element>(ctx: &ExecutionContext, host: &[T]) -> Result<Self> {
        let stream = Arc::clone(ctx.stream()?);
        let resource = ctx.resource()?;
        let backend = Arc::clone(ctx.backend()?);
        let bytes = std::mem::size_of_val(host);

        let block = if bytes == 0 {
            None
        } else {
            let block = resource.allocate(bytes, &stream)?;
            if let Err(error) =
                block.write_bytes(bytemuck::cast_slice(host), &stream).and_then(|_| backend.synchronize(&stream))
            {
                // A failed upload leaves nothing allocated behind.
                let _ = resource.deallocate(block, &stream);
                return Err(error);
            }
            Some(block)
        };

        Ok(Self {
            state: Some(BufferState { block, resource, stream, backend }),
            element: T::ELEMENT_TYPE,
            len: host.len(),
        })
    }

    /// Allocate a zero-filled buffer of `len` elements.
    pub fn zeroed<T: Element>(ctx: &ExecutionContext, len: usize) -> Result<Self> {
        let host = vec![T::zeroed(); len];
        Self::from_slice(ctx, &host)
    }

    fn state(&self) -> Result<&BufferState> {
        self.state.as_ref().context(HandleFreedSnafu { handle: "device buffer" })
    }

    fn check_element<T: Element>(&self) -> Result<()> {
        ensure!(
            self.element == T::ELEMENT_TYPE,
            ElementMismatchSnafu { actual: self.element, requested: T::ELEMENT_TYPE }
        );
        Ok(())
    }

    /// Element count. Stable from creation to release; survives release for
    /// introspection.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element_type(&self) -> ElementType {
        self.element
    }

    pub fn size_bytes(&self) -> usize {
        self.len * self.element.bytes()
    }

    /// Overwrite device contents from `host`; length and element type must
    /// match the buffer exactly.
    pub fn copyin<T: Element>(&mut self, host: &[T]) -> Result<()> {
        let state = self.state()?;
        self.check_element::<T>()?;
        ensure!(host.len() == self.len, SizeMismatchSnafu { expected: self.len, actual: host.len() });

        let Some(block) = state.block.as_ref() else { return Ok(()) };
        block.write_bytes(bytemuck::cast_slice(host), &state.stream)?;
        state.backend.synchronize(&state.stream)
    }

    /// Copy device contents into `out`; length and element type must match.
    pub fn copyout<T: Element>(&self, out: &mut [T]) -> Result<()> {
        let state = self.state()?;
        self.check_element::<T>()?;
        ensure!(out.len() == self.len, SizeMismatchSnafu { expected: self.len, actual: out.len() });

        let Some(block) = state.block.as_ref() else { return Ok(()) };
        // Flush pending work on the stream before reading back.
        state.backend.synchronize(&state.stream)?;
        block.read_bytes(bytemuck::cast_slice_mut(out), &state.stream)
    }

    /// Download into a fresh vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len];
        self.copyout(&mut out)?;
        Ok(out)
    }

    /// Release the allocation through the resource that produced it.
    ///
    /// The first call frees; any later call, or any transfer through the
    /// released handle, reports misuse. Dropping an unreleased buffer frees
    /// silently.
    pub fn release(&mut self) -> Result<()> {
        let state = self.state.take().context(HandleFreedSnafu { handle: "device buffer" })?;
        if let Some(block) = state.block {
            state.backend.synchronize(&state.stream)?;
            state.resource.deallocate(block, &state.stream)?;
        }
        Ok(())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Some(state) = self.state.take()
            && let Some(block) = state.block
        {
            let _ = state.resource.deallocate(block, &state.stream);
        }
    }
}
