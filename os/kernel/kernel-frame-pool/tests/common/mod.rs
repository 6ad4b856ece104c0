//! Simulated physical memory for pool tests.

#![allow(dead_code)]

use kernel_frame_pool::PhysMapper;
use std::cell::RefCell;

/// Sparse "physical RAM": only the byte ranges a pool actually maps (its
/// bitmap) are backed by host memory.
///
/// Fresh regions are filled with `0xFF` so a pool that forgets to initialize
/// its bitmap shows up as fully allocated.
///
/// Regions are freed when the `SparseRam` drops; keep it alive longer than
/// every pool built on it.
pub struct SparseRam {
    /// Start address and leaked backing store of every mapped region. All
    /// access, by pools and by the test itself, goes through these pointers.
    regions: RefCell<Vec<(u64, *mut [u8])>>,
}

impl SparseRam {
    pub fn new() -> Self {
        Self {
            regions: RefCell::new(Vec::new()),
        }
    }

    /// Number of distinct regions mapped so far.
    pub fn mapped_regions(&self) -> usize {
        self.regions.borrow().len()
    }

    /// Whether any mapping started at physical address `pa`.
    pub fn was_mapped_at(&self, pa: u64) -> bool {
        self.regions.borrow().iter().any(|(start, _)| *start == pa)
    }

    /// Read one byte of simulated RAM; `None` if the address was never mapped.
    pub fn read_byte(&self, pa: u64) -> Option<u8> {
        let regions = self.regions.borrow();
        let (start, region) = regions
            .iter()
            .find(|(start, region)| pa >= *start && pa < *start + region.len() as u64)?;
        let offset = (pa - start) as usize;
        // SAFETY: in bounds of a live region; no reference is created, so the
        // read does not conflict with the slice a pool holds.
        Some(unsafe { region.cast::<u8>().add(offset).read_volatile() })
    }
}

impl Drop for SparseRam {
    fn drop(&mut self) {
        for (_, region) in self.regions.get_mut().drain(..) {
            // SAFETY: produced by `Box::into_raw` and dropped exactly once.
            drop(unsafe { Box::from_raw(region) });
        }
    }
}

impl PhysMapper for SparseRam {
    unsafe fn phys_to_bytes<'a>(&self, pa: u64, len: usize) -> &'a mut [u8] {
        let mut regions = self.regions.borrow_mut();
        for &(start, region) in regions.iter() {
            let end = start + region.len() as u64;
            if pa >= start && pa + len as u64 <= end {
                let offset = (pa - start) as usize;
                // SAFETY: in bounds of a live region.
                return unsafe { std::slice::from_raw_parts_mut(region.cast::<u8>().add(offset), len) };
            }
            assert!(
                pa + len as u64 <= start || pa >= end,
                "mapping {pa:#x}+{len:#x} partially overlaps region at {start:#x}"
            );
        }

        let region = Box::into_raw(vec![0xFFu8; len].into_boxed_slice());
        regions.push((pa, region));
        // SAFETY: freshly leaked and only freed when `SparseRam` drops.
        unsafe { std::slice::from_raw_parts_mut(region.cast::<u8>(), len) }
    }
}
