//! Resource-boundary layer for GPU-resident algorithms.
//!
//! Everything a compute driver needs between "I have host arrays" and "the
//! math runs on the card": a per-runtime stream registry, configurable
//! memory resources (direct, pool, binning, arena), execution contexts and
//! typed device buffers. The CUDA backend sits behind the `cuda` feature;
//! the always-on host backend emulates a device, capacity ledger included,
//! so the full surface is testable on any machine.
//!
//! # Lifecycle
//!
//! ```
//! use granat_device::{DeviceBuffer, Runtime};
//!
//! # fn main() -> granat_device::Result<()> {
//! let runtime = Runtime::host();
//! let pool = runtime.install_pool(0, 1 << 20, 8 << 20)?;
//!
//! let mut ctx = runtime.create_context()?;
//! let mut buffer = DeviceBuffer::from_slice(&ctx, &[1.0f32, 2.0, 3.0])?;
//! assert_eq!(buffer.to_vec::<f32>()?, vec![1.0, 2.0, 3.0]);
//!
//! buffer.release()?;
//! ctx.free()?;
//! runtime.reset_resource(&pool)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod context;
pub mod element;
pub mod error;
pub mod resource;
pub mod runtime;
pub mod stream;

#[cfg(test)]
pub mod test;

pub use backend::{DeviceBackend, HostBackend, Slab};
pub use buffer::DeviceBuffer;
pub use context::{ContextOptions, ExecutionContext};
pub use element::{Element, ElementType};
pub use error::{Error, Result, Status};
pub use resource::{Block, DeviceResource, ResourceDesc, ResourceHandle, ResourceKind};
pub use runtime::Runtime;
pub use stream::{Stream, StreamKind, StreamRegistry};
