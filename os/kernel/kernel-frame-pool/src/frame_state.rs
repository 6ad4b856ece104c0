//! Per-frame allocation state.
//!
//! Every frame of a pool is in exactly one of four states, encoded in two bits:
//!
//! ```text
//! 00  Free             unallocated, eligible for get_frames
//! 01  HeadOfSequence   first frame of an allocated run
//! 10  Inaccessible     off-limits, never touched by search or release
//! 11  Allocated        continuation frame of a run, after its head
//! ```

/// Two-bit mask for a single state slot.
pub const STATE_MASK: u8 = 0b11;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[repr(u8)]
pub enum FrameState {
    /// Unallocated.
    #[default]
    Free = 0b00,
    /// First frame of an allocated run.
    HeadOfSequence = 0b01,
    /// Reserved; skipped by search, terminates a release walk.
    Inaccessible = 0b10,
    /// Non-head frame of an allocated run.
    Allocated = 0b11,
}

impl FrameState {
    /// Decode from the low two bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & STATE_MASK {
            0b00 => Self::Free,
            0b01 => Self::HeadOfSequence,
            0b10 => Self::Inaccessible,
            _ => Self::Allocated,
        }
    }

    /// Encode as two bits.
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }

    /// `true` for the states that make up an allocated run.
    #[inline]
    #[must_use]
    pub const fn is_allocated(self) -> bool {
        matches!(self, Self::HeadOfSequence | Self::Allocated)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::HeadOfSequence => "head-of-sequence",
            Self::Inaccessible => "inaccessible",
            Self::Allocated => "allocated",
        }
    }
}

impl core::fmt::Display for FrameState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
