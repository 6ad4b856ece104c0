//! # Physical Frame Numbers
//!
//! A physical frame is a `FRAME_SIZE`-aligned block of physical memory. Pools
//! never deal in byte ranges; they hand out [`FrameNumber`]s, which map to
//! physical addresses as `frame_number × FRAME_SIZE`.
//!
//! ```text
//!   frame 0        frame 1        frame 2
//! +--------------+--------------+--------------+---
//! | 0x0000..0FFF | 0x1000..1FFF | 0x2000..2FFF |
//! +--------------+--------------+--------------+---
//! ```

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Size of a single physical frame in bytes (power of two).
pub const FRAME_SIZE: u64 = 4096;

/// log2([`FRAME_SIZE`]), i.e., number of low address bits inside a frame.
pub const FRAME_SHIFT: u32 = 12;

/// [`FRAME_SIZE`] as a `usize`, for sizing byte buffers.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_SIZE_BYTES: usize = FRAME_SIZE as usize;

const _: () = assert!(1 << FRAME_SHIFT == FRAME_SIZE, "frame shift mismatch");

/// Number of a physical frame.
///
/// ### Examples
/// ```rust
/// # use kernel_frame_pool::{FrameNumber, FRAME_SIZE};
/// let frame = FrameNumber::new(512);
/// assert_eq!(frame.address(), 512 * FRAME_SIZE);
/// assert_eq!(FrameNumber::from_address(0x20_0042), frame);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u64);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical base address of this frame.
    #[inline]
    #[must_use]
    pub const fn address(self) -> u64 {
        self.0 << FRAME_SHIFT
    }

    /// The frame containing the physical address `pa` (lower bits dropped).
    #[inline]
    #[must_use]
    pub const fn from_address(pa: u64) -> Self {
        Self(pa >> FRAME_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, frames: u64) -> Option<Self> {
        match self.0.checked_add(frames) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for FrameNumber {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<FrameNumber> for u64 {
    #[inline]
    fn from(f: FrameNumber) -> Self {
        f.as_u64()
    }
}

impl Add<u64> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for FrameNumber {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Distance in frames between two frame numbers.
impl Sub for FrameNumber {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}
