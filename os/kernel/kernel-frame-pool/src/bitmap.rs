//! # Packed Frame-State Bitmap
//!
//! Stores one [`FrameState`] per frame in two bits, four frames per byte. The
//! lowest frame index of a byte occupies its most significant bits:
//!
//! ```text
//!   bit  7 6   5 4   3 2   1 0
//!      +-----+-----+-----+-----+
//!      | f+0 | f+1 | f+2 | f+3 |      f = 4 × byte index
//!      +-----+-----+-----+-----+
//! ```
//!
//! A pool whose frame 0 is the head of a run therefore starts with `0x40`.
//! All bit arithmetic for the pool lives here; callers only see
//! [`FrameStateBitmap::get`] and [`FrameStateBitmap::set`].

use crate::frame_state::FrameState;
use bitfield_struct::bitfield;

/// Frames tracked per bitmap byte.
pub const FRAMES_PER_BYTE: usize = 4;

/// One bitmap byte, viewed as four two-bit state slots.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct StateQuad {
    /// Fourth frame of the byte (bits 0..1).
    #[bits(2)]
    slot3: FrameState,
    /// Third frame of the byte (bits 2..3).
    #[bits(2)]
    slot2: FrameState,
    /// Second frame of the byte (bits 4..5).
    #[bits(2)]
    slot1: FrameState,
    /// First frame of the byte (bits 6..7).
    #[bits(2)]
    slot0: FrameState,
}

impl StateQuad {
    /// A byte with all four slots in `state`.
    #[inline]
    #[must_use]
    pub const fn splat(state: FrameState) -> Self {
        Self::new()
            .with_slot0(state)
            .with_slot1(state)
            .with_slot2(state)
            .with_slot3(state)
    }

    #[inline]
    #[must_use]
    pub const fn slot(self, index: usize) -> FrameState {
        match index % FRAMES_PER_BYTE {
            0 => self.slot0(),
            1 => self.slot1(),
            2 => self.slot2(),
            _ => self.slot3(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_slot(self, index: usize, state: FrameState) -> Self {
        match index % FRAMES_PER_BYTE {
            0 => self.with_slot0(state),
            1 => self.with_slot1(state),
            2 => self.with_slot2(state),
            _ => self.with_slot3(state),
        }
    }
}

/// Two-bit-per-frame state array over borrowed storage.
///
/// The storage is usually a frame of physical memory handed out by a
/// [`PhysMapper`](crate::PhysMapper), but any byte slice works (tests use
/// plain arrays).
///
/// # Invariants
/// - `bytes.len() >= bytes_for(len)`.
/// - Slots at index `>= len` are never read or written.
pub struct FrameStateBitmap<'a> {
    bytes: &'a mut [u8],
    len: usize,
}

impl<'a> FrameStateBitmap<'a> {
    /// Number of bytes needed to track `frames` frames.
    #[inline]
    #[must_use]
    pub const fn bytes_for(frames: usize) -> usize {
        frames.div_ceil(FRAMES_PER_BYTE)
    }

    /// Wrap `bytes` as a bitmap of `len` frames.
    ///
    /// Returns `None` if the storage is too small. The current contents are
    /// kept; use [`fill`](Self::fill) to initialize.
    #[must_use]
    pub fn from_bytes(bytes: &'a mut [u8], len: usize) -> Option<Self> {
        if bytes.len() < Self::bytes_for(len) {
            return None;
        }
        Some(Self { bytes, len })
    }

    /// Number of frames tracked.
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

    /// State of frame `index`.
    ///
    /// # Panics
    /// If `index >= self.len()`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> FrameState {
        assert!(index < self.len, "frame index {index} out of range");
        StateQuad::from_bits(self.bytes[index / FRAMES_PER_BYTE]).slot(index)
    }

    /// Set the state of frame `index`.
    ///
    /// # Panics
    /// If `index >= self.len()`.
    #[inline]
    pub fn set(&mut self, index: usize, state: FrameState) {
        assert!(index < self.len, "frame index {index} out of range");
        let byte = &mut self.bytes[index / FRAMES_PER_BYTE];
        *byte = StateQuad::from_bits(*byte)
            .with_slot(index, state)
            .into_bits();
    }

    /// Put every tracked frame into `state`.
    pub fn fill(&mut self, state: FrameState) {
        let full = self.len / FRAMES_PER_BYTE;
        self.bytes[..full].fill(StateQuad::splat(state).into_bits());
        for index in full * FRAMES_PER_BYTE..self.len {
            self.set(index, state);
        }
    }

    /// Mark `[start, start + n)` as one allocated run: a head followed by
    /// `n - 1` continuation frames. Does nothing for `n == 0`.
    ///
    /// # Panics
    /// If the run extends past `self.len()`.
    pub fn mark_run(&mut self, start: usize, n: usize) {
        if n == 0 {
            return;
        }
        self.set(start, FrameState::HeadOfSequence);
        for index in start + 1..start + n {
            self.set(index, FrameState::Allocated);
        }
    }

    /// Number of frames currently in `state`.
    #[must_use]
    pub fn count(&self, state: FrameState) -> usize {
        self.iter().filter(|s| *s == state).count()
    }

    /// Iterate over all frame states in index order.
    pub fn iter(&self) -> impl Iterator<Item = FrameState> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    /// The raw backing bytes that hold the tracked frames.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..Self::bytes_for(self.len)]
    }
}

impl core::fmt::Debug for FrameStateBitmap<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameStateBitmap")
            .field("len", &self.len)
            .field("free", &self.count(FrameState::Free))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_layout_is_msb_first() {
        let q = StateQuad::new().with_slot(0, FrameState::HeadOfSequence);
        assert_eq!(q.into_bits(), 0x40);

        let q = StateQuad::new().with_slot(3, FrameState::Allocated);
        assert_eq!(q.into_bits(), 0x03);

        let q = StateQuad::new().with_slot(1, FrameState::Inaccessible);
        assert_eq!(q.into_bits(), 0b0010_0000);
        assert_eq!(q.slot(1), FrameState::Inaccessible);
        assert_eq!(q.slot(0), FrameState::Free);
    }

    #[test]
    fn splat_fills_all_slots() {
        assert_eq!(StateQuad::splat(FrameState::Allocated).into_bits(), 0xFF);
        assert_eq!(StateQuad::splat(FrameState::HeadOfSequence).into_bits(), 0x55);
        assert_eq!(StateQuad::splat(FrameState::Free).into_bits(), 0x00);
    }

    #[test]
    fn set_only_touches_its_slot() {
        let mut raw = [0xFFu8; 2];
        let mut bm = FrameStateBitmap::from_bytes(&mut raw, 8).unwrap();
        bm.set(5, FrameState::Free);
        for i in 0..8 {
            let expected = if i == 5 {
                FrameState::Free
            } else {
                FrameState::Allocated
            };
            assert_eq!(bm.get(i), expected, "slot {i}");
        }
        assert_eq!(bm.as_bytes(), &[0xFF, 0b1100_1111]);
    }

    #[test]
    fn fill_and_count() {
        let mut raw = [0xAAu8; 4];
        let mut bm = FrameStateBitmap::from_bytes(&mut raw, 16).unwrap();
        assert_eq!(bm.count(FrameState::Inaccessible), 16);
        bm.fill(FrameState::Free);
        assert_eq!(bm.count(FrameState::Free), 16);
        assert_eq!(bm.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn fill_does_not_spill_past_len() {
        let mut raw = [0xFFu8; 2];
        {
            let mut bm = FrameStateBitmap::from_bytes(&mut raw, 6).unwrap();
            bm.fill(FrameState::Free);
            assert_eq!(bm.count(FrameState::Free), 6);
        }
        // slots 6 and 7 of the second byte stay untouched
        assert_eq!(raw, [0x00, 0x0F]);
    }

    #[test]
    fn mark_run_writes_head_then_continuation() {
        let mut raw = [0u8; 2];
        let mut bm = FrameStateBitmap::from_bytes(&mut raw, 8).unwrap();
        bm.mark_run(2, 4);
        let states: Vec<_> = bm.iter().collect();
        assert_eq!(
            states,
            [
                FrameState::Free,
                FrameState::Free,
                FrameState::HeadOfSequence,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::Free,
                FrameState::Free,
            ]
        );
        assert_eq!(bm.as_bytes(), &[0b0000_0111, 0b1111_0000]);
    }

    #[test]
    fn storage_too_small_is_rejected() {
        let mut raw = [0u8; 3];
        assert!(FrameStateBitmap::from_bytes(&mut raw, 16).is_none());
        assert!(FrameStateBitmap::from_bytes(&mut raw, 12).is_some());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_past_len_panics() {
        let mut raw = [0u8; 4];
        let bm = FrameStateBitmap::from_bytes(&mut raw, 8).unwrap();
        let _ = bm.get(8);
    }
}
