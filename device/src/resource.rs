//! Memory resources: accounting layers between buffers and backend slabs.
//!
//! A resource decides how raw reservations are carved into blocks. The
//! direct path takes one dedicated slab per request; pool, binning and
//! arena trade that simplicity for reuse patterns that suit iterative
//! workloads. All of them count outstanding blocks so a reset can refuse
//! while allocations are still live.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use snafu::ensure;
use tracing::debug;

use crate::backend::{DeviceBackend, Slab};
use crate::error::{
    ArenaExhaustedSnafu, BackendSnafu, ForeignDeviceSnafu, InvalidResourceConfigSnafu, PoolExhaustedSnafu, Result,
};
use crate::stream::Stream;

/// Granularity every request is rounded up to before accounting.
pub(crate) const ALLOC_ALIGN: usize = 256;

pub(crate) const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Which allocation strategy a resource implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::VariantArray, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ResourceKind {
    Direct,
    Pool,
    Binning,
    Arena,
}

/// Install-time description of a memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceDesc {
    /// Pre-reserved pool that grows up to `max_size`.
    Pool { initial_size: usize, max_size: usize },
    /// Power-of-two size classes for exponents `min_exponent..=max_exponent`;
    /// larger requests take a dedicated slab.
    Binning { min_exponent: u32, max_exponent: u32 },
    /// One fixed region, bump-allocated, never grown. `None` sizes the
    /// region to half of the device's free memory at install time.
    Arena { region_size: Option<usize> },
}

impl ResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDesc::Pool { .. } => ResourceKind::Pool,
            ResourceDesc::Binning { .. } => ResourceKind::Binning,
            ResourceDesc::Arena { .. } => ResourceKind::Arena,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            ResourceDesc::Pool { initial_size, max_size } => {
                ensure!(initial_size > 0, InvalidResourceConfigSnafu { reason: "pool initial size must be nonzero" });
                ensure!(
                    initial_size <= max_size,
                    InvalidResourceConfigSnafu {
                        reason: format!("pool initial size {initial_size} exceeds max size {max_size}")
                    }
                );
            }
            ResourceDesc::Binning { min_exponent, max_exponent } => {
                ensure!(
                    min_exponent <= max_exponent,
                    InvalidResourceConfigSnafu {
                        reason: format!("binning exponents inverted: {min_exponent} > {max_exponent}")
                    }
                );
                ensure!(
                    max_exponent < usize::BITS,
                    InvalidResourceConfigSnafu {
                        reason: format!("binning exponent {max_exponent} does not fit an address")
                    }
                );
            }
            ResourceDesc::Arena { region_size } => {
                if let Some(size) = region_size {
                    ensure!(size > 0, InvalidResourceConfigSnafu { reason: "arena region must be nonzero" });
                }
            }
        }
        Ok(())
    }
}

/// A sub-range of a slab handed out by a resource.
#[derive(Debug)]
pub struct Block {
    slab: Arc<Slab>,
    offset: usize,
    len: usize,
}

impl Block {
    fn new(slab: Arc<Slab>, offset: usize, len: usize) -> Self {
        Self { slab, offset, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn write_bytes(&self, src: &[u8], stream: &Stream) -> Result<()> {
        debug_assert!(src.len() <= self.len);
        self.slab.write_bytes(self.offset, src, stream)
    }

    pub(crate) fn read_bytes(&self, dst: &mut [u8], stream: &Stream) -> Result<()> {
        debug_assert!(dst.len() <= self.len);
        self.slab.read_bytes(self.offset, dst, stream)
    }

    fn same_slab(&self, slab: &Arc<Slab>) -> bool {
        Arc::ptr_eq(&self.slab, slab)
    }
}

/// Allocation strategy behind buffers.
///
/// Shared as `Arc<dyn DeviceResource>`: buffers keep a reference to the
/// resource that produced them, so frees route back to it even after
/// another resource becomes active.
pub trait DeviceResource: Send + Sync + fmt::Debug {
    fn allocate(&self, bytes: usize, stream: &Stream) -> Result<Block>;

    fn deallocate(&self, block: Block, stream: &Stream) -> Result<()>;

    fn kind(&self) -> ResourceKind;

    /// Number of live blocks handed out and not yet returned.
    fn outstanding(&self) -> usize;
}

/// Token for an installed resource, used to reset it later.
///
/// Passed by reference to [`crate::Runtime::reset_resource`]: a busy refusal
/// keeps the token usable for the retry, and resetting an already-reset
/// token is a harmless teardown no-op.
#[derive(Debug)]
pub struct ResourceHandle {
    pub(crate) id: u64,
    pub(crate) resource: Arc<dyn DeviceResource>,
}

impl ResourceHandle {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn outstanding(&self) -> usize {
        self.resource.outstanding()
    }
}

/// Default path: one dedicated slab per request.
#[derive(Debug)]
pub struct DirectResource {
    backend: Arc<dyn DeviceBackend>,
    outstanding: AtomicUsize,
}

impl DirectResource {
    pub(crate) fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self { backend, outstanding: AtomicUsize::new(0) }
    }
}

impl DeviceResource for DirectResource {
    fn allocate(&self, bytes: usize, stream: &Stream) -> Result<Block> {
        let slab = self.backend.alloc_slab(stream.device(), bytes.max(1))?;
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(Block::new(Arc::new(slab), 0, bytes))
    }

    fn deallocate(&self, block: Block, _stream: &Stream) -> Result<()> {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        drop(block);
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Direct
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct PoolSlab {
    slab: Arc<Slab>,
    bump: usize,
}

#[derive(Debug)]
struct PoolState {
    slabs: Vec<PoolSlab>,
    /// Freed blocks keyed by rounded size, most recently freed last.
    free: HashMap<usize, Vec<(usize, usize)>>,
    reserved: usize,
}

/// Growth-capped pool with exact-size block recycling.
///
/// `initial_size` is reserved at install time. Requests are served from the
/// free list first, then by bumping inside a reserved slab, then by growing
/// the reservation; growth doubles the reserved total when the cap allows
/// and the reservation never exceeds `max_size`.
#[derive(Debug)]
pub struct PoolResource {
    device: usize,
    max_size: usize,
    state: Mutex<PoolState>,
    backend: Arc<dyn DeviceBackend>,
    outstanding: AtomicUsize,
}

impl PoolResource {
    pub(crate) fn new(
        backend: Arc<dyn DeviceBackend>,
        device: usize,
        initial_size: usize,
        max_size: usize,
    ) -> Result<Self> {
        let initial = align_up(initial_size, ALLOC_ALIGN);
        let max_size = align_up(max_size, ALLOC_ALIGN);
        let slab = Arc::new(backend.alloc_slab(device, initial)?);
        let state = PoolState { slabs: vec![PoolSlab { slab, bump: 0 }], free: HashMap::new(), reserved: initial };
        Ok(Self { device, max_size, state: Mutex::new(state), backend, outstanding: AtomicUsize::new(0) })
    }

    /// Total bytes reserved from the backend.
    pub fn reserved(&self) -> usize {
        self.state.lock().reserved
    }
}

impl DeviceResource for PoolResource {
    fn allocate(&self, bytes: usize, stream: &Stream) -> Result<Block> {
        ensure!(
            stream.device() == self.device,
            ForeignDeviceSnafu { resource_device: self.device, request_device: stream.device() }
        );
        let size = align_up(bytes.max(1), ALLOC_ALIGN);
        let mut state = self.state.lock();

        // Recycled block of the same rounded size.
        if let Some(entries) = state.free.get_mut(&size)
            && let Some((slab_idx, offset)) = entries.pop()
        {
            if entries.is_empty() {
                state.free.remove(&size);
            }
            let slab = Arc::clone(&state.slabs[slab_idx].slab);
            self.outstanding.fetch_add(1, Ordering::Relaxed);
            return Ok(Block::new(slab, offset, bytes));
        }

        // Bump inside an already reserved slab.
        for pool_slab in state.slabs.iter_mut() {
            if pool_slab.slab.len() - pool_slab.bump >= size {
                let offset = pool_slab.bump;
                pool_slab.bump += size;
                let slab = Arc::clone(&pool_slab.slab);
                self.outstanding.fetch_add(1, Ordering::Relaxed);
                return Ok(Block::new(slab, offset, bytes));
            }
        }

        // Grow the reservation, doubling when the cap allows.
        let headroom = self.max_size - state.reserved;
        ensure!(
            size <= headroom,
            PoolExhaustedSnafu { requested: size, reserved: state.reserved, max_size: self.max_size }
        );
        let grow = size.max(state.reserved.min(headroom));
        let slab = Arc::new(self.backend.alloc_slab(self.device, grow)?);
        state.reserved += grow;
        debug!(device = self.device, grow, reserved = state.reserved, "pool grew");
        state.slabs.push(PoolSlab { slab: Arc::clone(&slab), bump: size });
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(Block::new(slab, 0, bytes))
    }

    fn deallocate(&self, block: Block, _stream: &Stream) -> Result<()> {
        let size = align_up(block.len().max(1), ALLOC_ALIGN);
        let mut state = self.state.lock();
        let Some(slab_idx) = state.slabs.iter().position(|pool_slab| block.same_slab(&pool_slab.slab)) else {
            return BackendSnafu { reason: "block returned to a pool that did not allocate it" }.fail();
        };
        state.free.entry(size).or_default().push((slab_idx, block.offset()));
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Pool
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Bin {
    slabs: Vec<Arc<Slab>>,
    /// (slab index, offset) pairs ready for reuse, most recent last.
    free: Vec<(usize, usize)>,
    /// Blocks carved from the newest slab.
    carved: usize,
}

/// Power-of-two size classes with a direct fallback above the largest bin.
///
/// Requests of at most `2^max_exponent` bytes round up to the smallest
/// adequate bin (never below `2^min_exponent`); larger requests take a
/// dedicated slab. Bin slabs are reserved lazily, carve fixed-size blocks
/// and recycle freed blocks LIFO.
#[derive(Debug)]
pub struct BinningResource {
    device: usize,
    min_exponent: u32,
    max_exponent: u32,
    bins: Vec<Mutex<Bin>>,
    backend: Arc<dyn DeviceBackend>,
    outstanding: AtomicUsize,
}

impl BinningResource {
    pub(crate) fn new(backend: Arc<dyn DeviceBackend>, device: usize, min_exponent: u32, max_exponent: u32) -> Self {
        let bins = (min_exponent..=max_exponent).map(|_| Mutex::new(Bin::default())).collect();
        Self { device, min_exponent, max_exponent, bins, backend, outstanding: AtomicUsize::new(0) }
    }

    /// Bin index for a request, `None` when it exceeds the largest bin.
    pub(crate) fn bin_index(&self, bytes: usize) -> Option<usize> {
        if bytes > 1usize << self.max_exponent {
            return None;
        }
        let exponent = bytes.next_power_of_two().trailing_zeros().max(self.min_exponent);
        Some((exponent - self.min_exponent) as usize)
    }

    fn blocks_per_slab(block_size: usize) -> usize {
        const TARGET_SLAB_BYTES: usize = 16 * 1024 * 1024;
        (TARGET_SLAB_BYTES / block_size).clamp(1, 32)
    }
}

impl DeviceResource for BinningResource {
    fn allocate(&self, bytes: usize, stream: &Stream) -> Result<Block> {
        ensure!(
            stream.device() == self.device,
            ForeignDeviceSnafu { resource_device: self.device, request_device: stream.device() }
        );
        let request = bytes.max(1);

        let Some(bin_idx) = self.bin_index(request) else {
            // Above the largest bin: dedicated slab, freed when the block drops.
            let slab = Arc::new(self.backend.alloc_slab(self.device, request)?);
            self.outstanding.fetch_add(1, Ordering::Relaxed);
            return Ok(Block::new(slab, 0, bytes));
        };

        let block_size = 1usize << (self.min_exponent + bin_idx as u32);
        let mut bin = self.bins[bin_idx].lock();

        if let Some((slab_idx, offset)) = bin.free.pop() {
            let slab = Arc::clone(&bin.slabs[slab_idx]);
            self.outstanding.fetch_add(1, Ordering::Relaxed);
            return Ok(Block::new(slab, offset, bytes));
        }

        let blocks = Self::blocks_per_slab(block_size);
        if bin.slabs.is_empty() || bin.carved == blocks {
            let slab = self.backend.alloc_slab(self.device, block_size * blocks)?;
            debug!(device = self.device, block_size, blocks, "binning reserved a bin slab");
            bin.slabs.push(Arc::new(slab));
            bin.carved = 0;
        }

        let slab_idx = bin.slabs.len() - 1;
        let offset = bin.carved * block_size;
        bin.carved += 1;
        let slab = Arc::clone(&bin.slabs[slab_idx]);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(Block::new(slab, offset, bytes))
    }

    fn deallocate(&self, block: Block, _stream: &Stream) -> Result<()> {
        if let Some(bin_idx) = self.bin_index(block.len().max(1)) {
            let mut bin = self.bins[bin_idx].lock();
            let Some(slab_idx) = bin.slabs.iter().position(|slab| block.same_slab(slab)) else {
                return BackendSnafu { reason: "block returned to a bin that did not allocate it" }.fail();
            };
            bin.free.push((slab_idx, block.offset()));
        }
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Binning
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ArenaState {
    bump: usize,
    live: usize,
}

/// Fixed region with monotonic bump allocation.
///
/// Frees only decrement the live count; the bump offset rewinds to the
/// start when the count reaches zero. The region never grows.
#[derive(Debug)]
pub struct ArenaResource {
    device: usize,
    region: Arc<Slab>,
    state: Mutex<ArenaState>,
}

impl ArenaResource {
    pub(crate) fn new(backend: Arc<dyn DeviceBackend>, device: usize, region_size: usize) -> Result<Self> {
        let region = Arc::new(backend.alloc_slab(device, region_size)?);
        Ok(Self { device, region, state: Mutex::new(ArenaState { bump: 0, live: 0 }) })
    }

    /// Bytes handed out since the last rewind.
    pub fn used(&self) -> usize {
        self.state.lock().bump
    }

    pub fn region_size(&self) -> usize {
        self.region.len()
    }
}

impl DeviceResource for ArenaResource {
    fn allocate(&self, bytes: usize, stream: &Stream) -> Result<Block> {
        ensure!(
            stream.device() == self.device,
            ForeignDeviceSnafu { resource_device: self.device, request_device: stream.device() }
        );
        let size = align_up(bytes.max(1), ALLOC_ALIGN);
        let mut state = self.state.lock();
        let remaining = self.region.len() - state.bump;
        ensure!(
            size <= remaining,
            ArenaExhaustedSnafu { requested: size, remaining, region_size: self.region.len() }
        );
        let offset = state.bump;
        state.bump += size;
        state.live += 1;
        Ok(Block::new(Arc::clone(&self.region), offset, bytes))
    }

    fn deallocate(&self, block: Block, _stream: &Stream) -> Result<()> {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        if state.live == 0 {
            state.bump = 0;
        }
        drop(block);
        Ok(())
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Arena
    }

    fn outstanding(&self) -> usize {
        self.state.lock().live
    }
}
