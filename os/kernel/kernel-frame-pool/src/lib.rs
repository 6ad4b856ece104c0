//! # Contiguous Physical Frame Pools
//!
//! This crate provides the kernel's physical frame allocator for requests that
//! need *physically contiguous* memory: DMA buffers, page-table structures and
//! anything else a device or the MMU reads without going through paging. A
//! pool hands out runs of consecutive 4 KiB frames and takes them back given
//! only the first frame number of the run.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │             SharedFramePools (optional)             │
//! │    • One coarse spin lock over all pools            │
//! │    • Usable from a `static`                         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │               FramePoolRegistry                     │
//! │    • Pools in registration order                    │
//! │    • Owner lookup from a bare frame number          │
//! │    • Process-wide release_frames                    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                ContFramePool                        │
//! │    • First-fit search for contiguous runs           │
//! │    • 2-bit frame states in a packed bitmap          │
//! │    • Bitmap self-hosted or in reserved frames       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frame States
//!
//! Each frame is tracked with two bits ([`FrameState`]):
//!
//! | Bits | State | Meaning |
//! |------|-------|---------|
//! | `00` | [`Free`](FrameState::Free) | Available to [`ContFramePool::get_frames`]. |
//! | `01` | [`HeadOfSequence`](FrameState::HeadOfSequence) | First frame of an allocated run. |
//! | `10` | [`Inaccessible`](FrameState::Inaccessible) | Off-limits; never allocated or released. |
//! | `11` | [`Allocated`](FrameState::Allocated) | Continuation frame of a run. |
//!
//! A run is one head followed by its continuation frames, so releasing the
//! head frees everything up to the next frame that is not a continuation.
//!
//! ## Failure Model
//!
//! - Broken preconditions (bad pool geometry, a request the pool cannot have
//!   headroom for, releasing a frame that is not a run head, a frame no pool
//!   owns) are reported as [`FramePoolError`]. A kernel will usually panic on
//!   them.
//! - Running out of *contiguous* space is expected and reported as `Ok(None)`.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_frame_pool::{ContFramePool, FrameNumber, FrameState, PoolConfig};
//!
//! // Storage for the bitmap of a 16-frame pool (4 bytes needed).
//! let mut bitmap = [0u8; 4];
//! let base = FrameNumber::new(512);
//! let mut pool = ContFramePool::with_storage(PoolConfig::self_hosted(base, 16), &mut bitmap)?;
//!
//! // Frame 0 of a self-hosted pool holds the bitmap.
//! assert_eq!(pool.n_free_frames(), 15);
//!
//! let first = pool.get_frames(3)?.expect("contiguous run");
//! assert_eq!(first, base + 1);
//! assert_eq!(pool.frame_state(first), Some(FrameState::HeadOfSequence));
//! assert_eq!(pool.n_free_frames(), 12);
//!
//! assert_eq!(pool.release_frames(first)?, 3);
//! assert_eq!(pool.n_free_frames(), 15);
//! # Ok::<(), kernel_frame_pool::FramePoolError>(())
//! ```
//!
//! In the kernel, pools are built from physical memory via a [`PhysMapper`]
//! ([`ContFramePool::new`]) and registered with a [`FramePoolRegistry`] so that
//! [`FramePoolRegistry::release_frames`] can find the owner of any frame.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bitmap;
mod error;
mod frame;
mod frame_state;
pub mod phys_mapper;
mod pool;
mod registry;
mod shared;

pub use crate::bitmap::FrameStateBitmap;
pub use crate::error::{FramePoolError, RegistryError};
pub use crate::frame::{FRAME_SHIFT, FRAME_SIZE, FRAME_SIZE_BYTES, FrameNumber};
pub use crate::frame_state::FrameState;
pub use crate::phys_mapper::{IdentityPhysMapper, OffsetPhysMapper, PhysMapper};
pub use crate::pool::{ContFramePool, MAX_POOL_FRAMES, PoolConfig, needed_info_frames};
pub use crate::registry::{DEFAULT_MAX_POOLS, FramePoolRegistry, PoolHandle};
pub use crate::shared::SharedFramePools;

/// Allocator of contiguous frame runs.
pub trait ContiguousFrameAlloc {
    /// Allocate `n` contiguous frames; `None` if the request cannot be served.
    fn alloc_frames(&mut self, n: usize) -> Option<FrameNumber>;

    /// Allocate a single frame.
    fn alloc_frame(&mut self) -> Option<FrameNumber> {
        self.alloc_frames(1)
    }

    /// Release the run starting at `first`; returns the number of frames freed.
    ///
    /// # Errors
    /// If `first` is not the head of a run owned by this allocator.
    fn free_frames(&mut self, first: FrameNumber) -> Result<usize, FramePoolError>;
}

impl ContiguousFrameAlloc for ContFramePool<'_> {
    fn alloc_frames(&mut self, n: usize) -> Option<FrameNumber> {
        self.get_frames(n).ok().flatten()
    }

    fn free_frames(&mut self, first: FrameNumber) -> Result<usize, FramePoolError> {
        self.release_frames(first)
    }
}

impl<const N: usize> ContiguousFrameAlloc for FramePoolRegistry<'_, N> {
    fn alloc_frames(&mut self, n: usize) -> Option<FrameNumber> {
        self.get_frames(n).ok().flatten()
    }

    fn free_frames(&mut self, first: FrameNumber) -> Result<usize, FramePoolError> {
        self.release_frames(first)
    }
}
