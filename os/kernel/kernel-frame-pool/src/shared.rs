//! # Shared Frame Pools
//!
//! The pool and registry types are single-threaded: every mutation needs
//! `&mut`. Once more than one CPU or context allocates frames, release has to
//! walk the registry and rewrite a bitmap as one step. [`SharedFramePools`]
//! puts the whole registry behind one coarse spin lock, which also covers
//! every pool's bitmap and free count.
//!
//! ```rust
//! use kernel_frame_pool::{ContFramePool, FrameNumber, PoolConfig, SharedFramePools};
//!
//! static POOLS: SharedFramePools<'static, 2> = SharedFramePools::new();
//!
//! let bitmap: &'static mut [u8] = Box::leak(Box::new([0u8; 16]));
//! let pool = ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(64), 64), bitmap)?;
//! POOLS.register(pool)?;
//!
//! let first = POOLS.get_frames(4)?.expect("free run");
//! assert_eq!(POOLS.release_frames(first)?, 4);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{FramePoolError, RegistryError};
use crate::frame::FrameNumber;
use crate::phys_mapper::PhysMapper;
use crate::pool::{ContFramePool, PoolConfig};
use crate::registry::{DEFAULT_MAX_POOLS, FramePoolRegistry, PoolHandle};
use spin::Mutex;

/// A [`FramePoolRegistry`] guarded by a single spin lock.
pub struct SharedFramePools<'a, const N: usize = DEFAULT_MAX_POOLS> {
    inner: Mutex<FramePoolRegistry<'a, N>>,
}

impl<'a, const N: usize> SharedFramePools<'a, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(FramePoolRegistry::new()),
        }
    }

    /// Run `f` with exclusive access to the registry.
    #[inline]
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut FramePoolRegistry<'a, N>) -> R) -> R {
        let mut registry = self.inner.lock();
        f(&mut registry)
    }

    /// See [`FramePoolRegistry::register`].
    ///
    /// # Errors
    /// Any [`RegistryError`] from the registry.
    pub fn register(&self, pool: ContFramePool<'a>) -> Result<PoolHandle, RegistryError> {
        self.with_registry(|r| r.register(pool))
    }

    /// See [`FramePoolRegistry::create_pool`].
    ///
    /// # Errors
    /// Any [`RegistryError`] from the registry.
    ///
    /// # Safety
    /// Same contract as [`ContFramePool::new`].
    pub unsafe fn create_pool<M>(
        &self,
        mapper: &M,
        config: PoolConfig,
    ) -> Result<PoolHandle, RegistryError>
    where
        M: PhysMapper + ?Sized,
    {
        // SAFETY: Forwarded to the caller.
        self.with_registry(|r| unsafe { r.create_pool(mapper, config) })
    }

    /// See [`FramePoolRegistry::get_frames`].
    ///
    /// # Errors
    /// [`FramePoolError::EmptyRequest`] for `n == 0`.
    pub fn get_frames(&self, n: usize) -> Result<Option<FrameNumber>, FramePoolError> {
        self.with_registry(|r| r.get_frames(n))
    }

    /// Allocate from one specific pool; see [`ContFramePool::get_frames`].
    ///
    /// # Errors
    /// Any error of [`ContFramePool::get_frames`]. An unknown handle yields
    /// `Ok(None)`.
    pub fn get_frames_from(
        &self,
        handle: PoolHandle,
        n: usize,
    ) -> Result<Option<FrameNumber>, FramePoolError> {
        self.with_registry(|r| match r.pool_mut(handle) {
            Some(pool) => pool.get_frames(n),
            None => Ok(None),
        })
    }

    /// See [`FramePoolRegistry::release_frames`].
    ///
    /// # Errors
    /// Any error of [`FramePoolRegistry::release_frames`].
    pub fn release_frames(&self, first: FrameNumber) -> Result<usize, FramePoolError> {
        self.with_registry(|r| r.release_frames(first))
    }

    /// Free frames summed over all pools.
    #[must_use]
    pub fn n_free_frames(&self) -> usize {
        self.with_registry(|r| r.n_free_frames())
    }

    /// Exclusive access when you have `&mut self` (no contention possible).
    #[inline]
    pub fn get_mut(&mut self) -> &mut FramePoolRegistry<'a, N> {
        self.inner.get_mut()
    }
}

impl<const N: usize> Default for SharedFramePools<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
