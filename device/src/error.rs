use snafu::Snafu;

use crate::element::ElementType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse failure classification carried across the boundary.
///
/// Every [`Error`] collapses onto exactly one status via [`Error::status`],
/// so callers that only branch on the class of failure never have to match
/// the full enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::VariantArray, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Status {
    /// Malformed configuration or argument; nothing was attempted.
    InvalidArgument = 1,
    /// The backing store cannot satisfy the request.
    AllocationFailure = 2,
    /// A handle was used outside its lifecycle (freed twice, used after free).
    HandleMisuse = 3,
    /// The device runtime itself failed.
    RuntimeFailure = 4,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Device ordinal outside the backend's range.
    #[snafu(display("invalid device ordinal {ordinal}: backend exposes {count} device(s)"))]
    InvalidOrdinal { ordinal: usize, count: usize },

    /// Malformed memory-resource configuration.
    #[snafu(display("invalid resource configuration: {reason}"))]
    InvalidResourceConfig { reason: String },

    /// Stream belongs to a different device than the handle it was given to.
    #[snafu(display("stream affinity mismatch: stream is on device {stream_device}, handle is on device {handle_device}"))]
    StreamAffinity { stream_device: usize, handle_device: usize },

    /// Typed access with the wrong element tag.
    #[snafu(display("element type mismatch: buffer holds {actual:?}, caller asked for {requested:?}"))]
    ElementMismatch { actual: ElementType, requested: ElementType },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// The device (or its emulation) is out of memory.
    #[snafu(display("out of device memory: requested {requested} bytes, {available} available on device {ordinal}"))]
    OutOfDeviceMemory { requested: usize, available: usize, ordinal: usize },

    /// Pool reached its growth cap.
    #[snafu(display("pool exhausted: requested {requested} bytes with {reserved} of {max_size} reserved"))]
    PoolExhausted { requested: usize, reserved: usize, max_size: usize },

    /// Arena region cannot fit the request; arenas never grow.
    #[snafu(display("arena exhausted: requested {requested} bytes, {remaining} of {region_size} remain"))]
    ArenaExhausted { requested: usize, remaining: usize, region_size: usize },

    /// Operation through a handle that was already freed.
    #[snafu(display("{handle} used after free"))]
    HandleFreed { handle: &'static str },

    /// Reset refused: the resource still backs live allocations.
    #[snafu(display("resource has {outstanding} outstanding allocation(s); release them before reset"))]
    ResourceBusy { outstanding: usize },

    /// Allocation routed to a resource bound to another device.
    #[snafu(display("resource is bound to device {resource_device}, request came from device {request_device}"))]
    ForeignDevice { resource_device: usize, request_device: usize },

    /// Backend could not create a stream.
    #[snafu(display("stream creation failed on device {ordinal}: {reason}"))]
    StreamCreation { ordinal: usize, reason: String },

    /// Copy, synchronization or other backend fault.
    #[snafu(display("device runtime fault: {reason}"))]
    Backend { reason: String },

    #[cfg(feature = "cuda")]
    #[snafu(display("CUDA error: {source}"))]
    Cuda { source: cudarc::driver::DriverError },
}

impl Error {
    /// Collapse onto the four-value status taxonomy.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidOrdinal { .. }
            | Error::InvalidResourceConfig { .. }
            | Error::StreamAffinity { .. }
            | Error::ElementMismatch { .. }
            | Error::SizeMismatch { .. }
            | Error::ForeignDevice { .. } => Status::InvalidArgument,

            Error::OutOfDeviceMemory { .. } | Error::PoolExhausted { .. } | Error::ArenaExhausted { .. } => {
                Status::AllocationFailure
            }

            Error::HandleFreed { .. } | Error::ResourceBusy { .. } => Status::HandleMisuse,

            Error::StreamCreation { .. } | Error::Backend { .. } => Status::RuntimeFailure,
            #[cfg(feature = "cuda")]
            Error::Cuda { .. } => Status::RuntimeFailure,
        }
    }
}
