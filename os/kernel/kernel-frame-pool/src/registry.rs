//! # Pool Registry
//!
//! Releasing a run only names its first frame, not the pool it came from. The
//! [`FramePoolRegistry`] keeps every live pool in registration order and
//! resolves the owner of a bare frame number with a linear scan over the
//! pools' `[base, base + n_frames)` ranges.
//!
//! Pools are appended at the tail and never removed. The registry has a fixed
//! capacity so it works before any heap exists.
//!
//! ```rust
//! use kernel_frame_pool::{ContFramePool, FrameNumber, FramePoolRegistry, PoolConfig};
//!
//! let mut kernel_bitmap = [0u8; 128];
//! let mut process_bitmap = [0u8; 128];
//! let mut pools = FramePoolRegistry::<4>::new();
//!
//! let kernel = ContFramePool::with_storage(
//!     PoolConfig::self_hosted(FrameNumber::new(512), 512),
//!     &mut kernel_bitmap,
//! )?;
//! let process = ContFramePool::with_storage(
//!     PoolConfig::external(FrameNumber::new(1024), 512, FrameNumber::new(600), 1),
//!     &mut process_bitmap,
//! )?;
//! let kernel = pools.register(kernel)?;
//! let process = pools.register(process)?;
//!
//! let first = pools.pool_mut(process).unwrap().get_frames(8)?.unwrap();
//! assert_eq!(first, FrameNumber::new(1024));
//! assert_eq!(pools.release_frames(first)?, 8);
//! # let _ = kernel;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{FramePoolError, RegistryError};
use crate::frame::FrameNumber;
use crate::phys_mapper::PhysMapper;
use crate::pool::{ContFramePool, PoolConfig};
use log::{debug, info};

/// Default number of pools a registry can hold.
pub const DEFAULT_MAX_POOLS: usize = 8;

/// Position of a pool in its registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PoolHandle(usize);

impl PoolHandle {
    /// Registration order of the pool, starting at 0.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Insertion-ordered set of frame pools with disjoint frame ranges.
pub struct FramePoolRegistry<'a, const N: usize = DEFAULT_MAX_POOLS> {
    /// Slots `0..len` are occupied, the rest are `None`.
    pools: [Option<ContFramePool<'a>>; N],
    len: usize,
}

impl<'a, const N: usize> FramePoolRegistry<'a, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: [const { None }; N],
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `pool` to the registry.
    ///
    /// # Errors
    /// - [`RegistryError::Full`] if all `N` slots are taken.
    /// - [`RegistryError::Overlap`] if the pool shares frames with a registered pool.
    pub fn register(&mut self, pool: ContFramePool<'a>) -> Result<PoolHandle, RegistryError> {
        self.check_slot_for(pool.base_frame_no(), pool.n_frames())?;
        let handle = PoolHandle(self.len);
        info!(
            "Registered frame pool #{} at frames {}..{}",
            handle.index(),
            pool.base_frame_no(),
            pool.end_frame_no()
        );
        self.pools[self.len] = Some(pool);
        self.len += 1;
        Ok(handle)
    }

    /// Construct a pool through `mapper` and register it.
    ///
    /// Capacity and overlap are checked before the bitmap memory is touched.
    ///
    /// # Errors
    /// Any [`RegistryError`], including construction failures wrapped in
    /// [`RegistryError::Pool`].
    ///
    /// # Safety
    /// Same contract as [`ContFramePool::new`].
    pub unsafe fn create_pool<M>(
        &mut self,
        mapper: &M,
        config: PoolConfig,
    ) -> Result<PoolHandle, RegistryError>
    where
        M: PhysMapper + ?Sized,
    {
        config.validate()?;
        self.check_slot_for(config.base_frame_no, config.n_frames)?;
        // SAFETY: Forwarded to the caller.
        let pool = unsafe { ContFramePool::new(mapper, config)? };
        self.register(pool)
    }

    #[must_use]
    pub fn pool(&self, handle: PoolHandle) -> Option<&ContFramePool<'a>> {
        self.pools.get(handle.0)?.as_ref()
    }

    #[must_use]
    pub fn pool_mut(&mut self, handle: PoolHandle) -> Option<&mut ContFramePool<'a>> {
        self.pools.get_mut(handle.0)?.as_mut()
    }

    /// Registered pools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ContFramePool<'a>> {
        self.pools[..self.len].iter().flatten()
    }

    /// Handle of the pool owning `frame`.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolHandle> {
        self.iter().position(|p| p.contains(frame)).map(PoolHandle)
    }

    /// The pool whose frame range contains `frame`.
    #[must_use]
    pub fn find_owner(&self, frame: FrameNumber) -> Option<&ContFramePool<'a>> {
        self.iter().find(|p| p.contains(frame))
    }

    #[must_use]
    pub fn find_owner_mut(&mut self, frame: FrameNumber) -> Option<&mut ContFramePool<'a>> {
        self.pools[..self.len]
            .iter_mut()
            .flatten()
            .find(|p| p.contains(frame))
    }

    /// Release the run starting at `first`, whichever pool owns it.
    ///
    /// # Errors
    /// - [`FramePoolError::NoOwningPool`] if no registered pool contains `first`.
    /// - Any error of [`ContFramePool::release_frames`].
    pub fn release_frames(&mut self, first: FrameNumber) -> Result<usize, FramePoolError> {
        let Some(pool) = self.find_owner_mut(first) else {
            debug!("Release of frame {first} matches no registered pool");
            return Err(FramePoolError::NoOwningPool { frame: first });
        };
        pool.release_frames(first)
    }

    /// Allocate `n` contiguous frames from the first pool, in registration
    /// order, that can provide them.
    ///
    /// Pools without enough headroom for the request are skipped. Returns
    /// `Ok(None)` if no pool has a sufficient free run.
    ///
    /// # Errors
    /// [`FramePoolError::EmptyRequest`] for `n == 0`.
    pub fn get_frames(&mut self, n: usize) -> Result<Option<FrameNumber>, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::EmptyRequest);
        }
        for pool in self.pools[..self.len].iter_mut().flatten() {
            match pool.get_frames(n) {
                Ok(Some(first)) => return Ok(Some(first)),
                Ok(None) | Err(FramePoolError::InsufficientFreeFrames { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Free frames summed over all pools.
    #[must_use]
    pub fn n_free_frames(&self) -> usize {
        self.iter().map(ContFramePool::n_free_frames).sum()
    }

    /// Frames managed by all pools.
    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.iter().map(ContFramePool::n_frames).sum()
    }

    fn check_slot_for(&self, base: FrameNumber, n_frames: usize) -> Result<(), RegistryError> {
        if self.len == N {
            return Err(RegistryError::Full { capacity: N });
        }
        if let Some(existing) = self.iter().find(|p| p.overlaps(base, n_frames)) {
            return Err(RegistryError::Overlap {
                base,
                existing: existing.base_frame_no(),
            });
        }
        Ok(())
    }
}

impl<const N: usize> Default for FramePoolRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for FramePoolRegistry<'_, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_is_empty() {
        let pools = FramePoolRegistry::<3>::new();
        assert!(pools.is_empty());
        assert_eq!(pools.capacity(), 3);
        assert_eq!(pools.n_free_frames(), 0);
        assert!(pools.find_owner(FrameNumber::new(0)).is_none());
    }

    #[test]
    fn handles_follow_registration_order() {
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        let mut pools = FramePoolRegistry::<2>::new();
        let first = pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(64), 32), &mut a)
                    .unwrap(),
            )
            .unwrap();
        let second = pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(8), 32), &mut b)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(pools.owner_of(FrameNumber::new(70)), Some(first));
        assert_eq!(pools.owner_of(FrameNumber::new(39)), Some(second));
        assert_eq!(pools.owner_of(FrameNumber::new(40)), None);
        assert_eq!(pools.n_frames(), 64);
        assert_eq!(pools.n_free_frames(), 62);
    }

    #[test]
    fn full_registry_rejects_pools() {
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        let mut pools = FramePoolRegistry::<1>::new();
        pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(0), 8), &mut a)
                    .unwrap(),
            )
            .unwrap();
        let err = pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(8), 8), &mut b)
                    .unwrap(),
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::Full { capacity: 1 });
    }

    #[test]
    fn overlapping_pools_are_rejected() {
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        let mut pools = FramePoolRegistry::<4>::new();
        pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(16), 16), &mut a)
                    .unwrap(),
            )
            .unwrap();
        let err = pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(24), 16), &mut b)
                    .unwrap(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Overlap {
                base: FrameNumber::new(24),
                existing: FrameNumber::new(16)
            }
        );
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn release_of_unowned_frame_is_rejected() {
        let mut a = [0u8; 8];
        let mut pools = FramePoolRegistry::<2>::new();
        pools
            .register(
                ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(16), 16), &mut a)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            pools.release_frames(FrameNumber::new(32)),
            Err(FramePoolError::NoOwningPool {
                frame: FrameNumber::new(32)
            })
        );
    }
}
