//! # Physical Memory Access for Pool Bitmaps
//!
//! A pool keeps its frame-state bitmap inside a physical frame: either the
//! first frame of the pool itself or frames reserved elsewhere. Code can only
//! dereference virtual addresses, so the pool asks a [`PhysMapper`] for a
//! writable view of those bytes.
//!
//! ## Strategies
//! - [`IdentityPhysMapper`]: physical addresses are usable as-is (early boot,
//!   identity-mapped low memory).
//! - [`OffsetPhysMapper`]: physical memory is reachable at a fixed virtual
//!   offset, e.g. a higher-half direct map (HHDM) at `HHDM_BASE + pa`.
//!
//! Tests provide their own mapper over simulated RAM.

/// Translate a physical byte range into a writable slice.
pub trait PhysMapper {
    /// Map `len` bytes starting at physical address `pa`.
    ///
    /// # Safety
    /// - `[pa, pa + len)` must be mapped, writable and valid for `'a`.
    /// - The caller must guarantee exclusive access to the range for `'a`;
    ///   no other live reference may alias it.
    unsafe fn phys_to_bytes<'a>(&self, pa: u64, len: usize) -> &'a mut [u8];
}

/// [`PhysMapper`] for identity-mapped physical memory.
///
/// The boot environment of a small kernel typically identity maps the low
/// physical range that holds the pools, so a frame at `n × FRAME_SIZE` can be
/// touched directly at that address.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_bytes<'a>(&self, pa: u64, len: usize) -> &'a mut [u8] {
        let ptr = pa as usize as *mut u8;
        // SAFETY: Caller guarantees the range is identity mapped and exclusive.
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}

/// [`PhysMapper`] for kernels that map all physical memory at a fixed offset.
///
/// # Example
/// ```rust
/// use kernel_frame_pool::OffsetPhysMapper;
/// const HHDM_BASE: u64 = 0xFFFF_8880_0000_0000;
/// let mapper = OffsetPhysMapper::new(HHDM_BASE);
/// assert_eq!(mapper.virtual_address(0x1000), HHDM_BASE + 0x1000);
/// ```
#[derive(Debug, Copy, Clone)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// Virtual address at which physical address `pa` is visible.
    #[inline]
    #[must_use]
    pub const fn virtual_address(&self, pa: u64) -> u64 {
        self.offset.wrapping_add(pa)
    }
}

impl PhysMapper for OffsetPhysMapper {
    unsafe fn phys_to_bytes<'a>(&self, pa: u64, len: usize) -> &'a mut [u8] {
        let ptr = self.virtual_address(pa) as usize as *mut u8;
        // SAFETY: Caller must ensure the physical range is covered by the direct map.
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}
