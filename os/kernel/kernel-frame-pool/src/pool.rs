//! # Contiguous Frame Pool
//!
//! A [`ContFramePool`] owns one contiguous range of physical frames and hands
//! out *runs* of consecutive frames from it. Each frame's state lives in a
//! packed two-bit [`FrameStateBitmap`]; an allocated run is a
//! [`HeadOfSequence`](FrameState::HeadOfSequence) frame followed by zero or more
//! [`Allocated`](FrameState::Allocated) frames, so releasing a run only needs
//! its first frame number.
//!
//! ```text
//!  base                                                    base + n_frames
//!   │                                                                  │
//!   ▼                                                                  ▼
//!  ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//!  │ H │ H │ A │ A │ . │ . │ H │ . │ . │ . │ . │ . │ . │ . │ . │ . │
//!  └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//!   bitmap  run of 3        run of 1
//! ```
//!
//! ## Bitmap hosting
//! - **Self-hosted** (`info_frame_no == 0`): the bitmap lives in the pool's
//!   first frame, which is marked as an allocated run at construction and can
//!   never be released.
//! - **External**: the bitmap lives at `info_frame_no`, typically inside a run
//!   allocated from another pool. Use [`needed_info_frames`] to size it.

use crate::bitmap::FrameStateBitmap;
use crate::error::FramePoolError;
use crate::frame::{FRAME_SIZE_BYTES, FrameNumber};
use crate::frame_state::FrameState;
use crate::phys_mapper::PhysMapper;
use log::{debug, info, trace, warn};

/// Bits of bitmap storage per frame.
const BITS_PER_FRAME: usize = 2;

/// Largest pool a single instance may manage, in frames.
pub const MAX_POOL_FRAMES: usize = 8 * FRAME_SIZE_BYTES;

/// Number of whole frames needed to hold the bitmap for `n_frames` frames.
///
/// ```rust
/// # use kernel_frame_pool::needed_info_frames;
/// assert_eq!(needed_info_frames(0), 0);
/// assert_eq!(needed_info_frames(512), 1);
/// assert_eq!(needed_info_frames(16 * 1024), 1);
/// assert_eq!(needed_info_frames(16 * 1024 + 8), 2);
/// ```
#[must_use]
pub const fn needed_info_frames(n_frames: usize) -> usize {
    (n_frames * BITS_PER_FRAME).div_ceil(8 * FRAME_SIZE_BYTES)
}

/// Static parameters of a pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PoolConfig {
    /// First physical frame owned by the pool.
    pub base_frame_no: FrameNumber,
    /// Number of frames owned; a non-zero multiple of 8.
    pub n_frames: usize,
    /// Frame holding the bitmap, or `0` to host it in the pool's first frame.
    pub info_frame_no: FrameNumber,
    /// Frames available at `info_frame_no`. Ignored for self-hosted pools.
    pub n_info_frames: usize,
}

impl PoolConfig {
    /// A pool that keeps its bitmap in its own first frame.
    #[must_use]
    pub const fn self_hosted(base_frame_no: FrameNumber, n_frames: usize) -> Self {
        Self {
            base_frame_no,
            n_frames,
            info_frame_no: FrameNumber::new(0),
            n_info_frames: 0,
        }
    }

    /// A pool whose bitmap lives in `n_info_frames` frames at `info_frame_no`.
    #[must_use]
    pub const fn external(
        base_frame_no: FrameNumber,
        n_frames: usize,
        info_frame_no: FrameNumber,
        n_info_frames: usize,
    ) -> Self {
        Self {
            base_frame_no,
            n_frames,
            info_frame_no,
            n_info_frames,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_self_hosted(&self) -> bool {
        self.info_frame_no.as_u64() == 0
    }

    /// Frame that holds the first byte of the bitmap.
    #[inline]
    #[must_use]
    pub const fn bitmap_frame(&self) -> FrameNumber {
        if self.is_self_hosted() {
            self.base_frame_no
        } else {
            self.info_frame_no
        }
    }

    /// Check the size constraints of the pool.
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyPool`] if `n_frames == 0`.
    /// - [`FramePoolError::PoolTooLarge`] above [`MAX_POOL_FRAMES`].
    /// - [`FramePoolError::PoolNotMultipleOfEight`] if `n_frames % 8 != 0`.
    /// - [`FramePoolError::InfoFramesTooSmall`] if an external bitmap does not fit.
    /// - [`FramePoolError::FrameOutOfRange`] if the range wraps the frame space.
    pub const fn validate(&self) -> Result<(), FramePoolError> {
        let n_frames = self.n_frames;
        if n_frames == 0 {
            return Err(FramePoolError::EmptyPool);
        }
        if n_frames > MAX_POOL_FRAMES {
            return Err(FramePoolError::PoolTooLarge {
                n_frames,
                max: MAX_POOL_FRAMES,
            });
        }
        if n_frames % 8 != 0 {
            return Err(FramePoolError::PoolNotMultipleOfEight { n_frames });
        }
        let needed = needed_info_frames(n_frames);
        if !self.is_self_hosted() && self.n_info_frames < needed {
            return Err(FramePoolError::InfoFramesTooSmall {
                n_frames,
                needed,
                provided: self.n_info_frames,
            });
        }
        if self.base_frame_no.checked_add(n_frames as u64).is_none() {
            return Err(FramePoolError::FrameOutOfRange {
                first: self.base_frame_no,
                count: n_frames,
            });
        }
        Ok(())
    }
}

/// Allocator for contiguous runs of frames within one physical range.
///
/// # Invariants
/// - `n_free_frames` equals the number of [`FrameState::Free`] slots.
/// - Every [`FrameState::Allocated`] slot follows, within its run, exactly one
///   [`FrameState::HeadOfSequence`] slot.
/// - For self-hosted pools, slots `0..n_info_frames` hold the bitmap and stay
///   allocated for the pool's lifetime.
#[derive(Debug)]
pub struct ContFramePool<'a> {
    base_frame_no: FrameNumber,
    n_frames: usize,
    n_free_frames: usize,
    info_frame_no: FrameNumber,
    n_info_frames: usize,
    self_hosted: bool,
    bitmap: FrameStateBitmap<'a>,
}

impl<'a> ContFramePool<'a> {
    /// Construct a pool whose bitmap is reached through `mapper`.
    ///
    /// The bitmap is placed at `info_frame_no × FRAME_SIZE`, or at the pool's
    /// own base for self-hosted pools, and every frame starts out free (except
    /// the bitmap frame of a self-hosted pool).
    ///
    /// # Errors
    /// See [`PoolConfig::validate`].
    ///
    /// # Safety
    /// - The bitmap frame(s) must be mapped by `mapper`, writable and exclusive
    ///   to this pool for `'a`.
    /// - An external bitmap must not overlap frames any pool can hand out.
    pub unsafe fn new<M>(mapper: &M, config: PoolConfig) -> Result<Self, FramePoolError>
    where
        M: PhysMapper + ?Sized,
    {
        config.validate()?;
        let len = FrameStateBitmap::bytes_for(config.n_frames);
        // SAFETY: Caller guarantees the bitmap frames are mapped and exclusive.
        let storage = unsafe { mapper.phys_to_bytes(config.bitmap_frame().address(), len) };
        Self::with_storage(config, storage)
    }

    /// Construct a pool over caller-provided bitmap storage.
    ///
    /// `storage` stands in for the bitmap frame(s) described by `config`.
    ///
    /// # Errors
    /// See [`PoolConfig::validate`]; additionally
    /// [`FramePoolError::InfoFramesTooSmall`] if `storage` cannot hold the bitmap.
    pub fn with_storage(config: PoolConfig, storage: &'a mut [u8]) -> Result<Self, FramePoolError> {
        config.validate()?;
        let n_frames = config.n_frames;
        let needed = needed_info_frames(n_frames);
        let provided = storage.len() / FRAME_SIZE_BYTES;
        let Some(mut bitmap) = FrameStateBitmap::from_bytes(storage, n_frames) else {
            return Err(FramePoolError::InfoFramesTooSmall {
                n_frames,
                needed,
                provided,
            });
        };

        bitmap.fill(FrameState::Free);
        let mut pool = Self {
            base_frame_no: config.base_frame_no,
            n_frames,
            n_free_frames: n_frames,
            info_frame_no: config.bitmap_frame(),
            n_info_frames: config.n_info_frames,
            self_hosted: config.is_self_hosted(),
            bitmap,
        };

        if pool.self_hosted {
            pool.bitmap.mark_run(0, needed);
            pool.n_free_frames -= needed;
            pool.n_info_frames = needed;
        }

        info!(
            "Frame pool initialized: frames {}..{} ({} frames, {} free), bitmap {} at frame {}",
            pool.base_frame_no,
            pool.end_frame_no(),
            pool.n_frames,
            pool.n_free_frames,
            if pool.self_hosted { "self-hosted" } else { "external" },
            pool.info_frame_no,
        );
        Ok(pool)
    }

    /// Number of whole frames needed to hold the bitmap for `n_frames` frames.
    #[inline]
    #[must_use]
    pub const fn needed_info_frames(n_frames: usize) -> usize {
        needed_info_frames(n_frames)
    }

    /// Allocate `n` contiguous frames, first fit.
    ///
    /// Returns the first frame of the run, or `Ok(None)` if no run of `n` free
    /// frames exists, even when enough frames are free in total.
    ///
    /// The pool always keeps at least one frame of headroom: a request for as
    /// many frames as are free is refused.
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyRequest`] for `n == 0`.
    /// - [`FramePoolError::InsufficientFreeFrames`] unless `n_free_frames > n`.
    pub fn get_frames(&mut self, n: usize) -> Result<Option<FrameNumber>, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::EmptyRequest);
        }
        if self.n_free_frames <= n {
            return Err(FramePoolError::InsufficientFreeFrames {
                requested: n,
                free: self.n_free_frames,
            });
        }

        let Some(start) = self.find_free_run(n) else {
            debug!(
                "No run of {n} contiguous frames in pool at {} ({} free)",
                self.base_frame_no, self.n_free_frames
            );
            return Ok(None);
        };

        self.bitmap.mark_run(start, n);
        self.n_free_frames -= n;
        let first = self.frame_at(start);
        trace!("Allocated {n} frames at {first}, {} left free", self.n_free_frames);
        Ok(Some(first))
    }

    /// Reserve `n` frames starting at `base` as a pre-allocated run.
    ///
    /// The frames become a head followed by `n - 1` continuation frames,
    /// whatever their prior state; no search and no headroom check take place.
    /// Frames that were free stop counting as free. The run can later be
    /// returned with [`release_frames`](Self::release_frames).
    ///
    /// # Errors
    /// - [`FramePoolError::FrameOutOfRange`] unless `[base, base + n)` lies in the pool.
    /// - [`FramePoolError::BitmapFrame`] if the range covers a self-hosted bitmap.
    pub fn mark_inaccessible(&mut self, base: FrameNumber, n: usize) -> Result<(), FramePoolError> {
        let start = self.index_of_range(base, n)?;
        if self.self_hosted && start < self.n_info_frames {
            return Err(FramePoolError::BitmapFrame { frame: base });
        }
        if n == 0 {
            return Ok(());
        }

        let previously_free = (start..start + n)
            .filter(|&index| self.bitmap.get(index).is_free())
            .count();
        self.bitmap.mark_run(start, n);
        self.n_free_frames -= previously_free;
        debug!(
            "Marked frames {base}..+{n} inaccessible ({previously_free} were free, {} left free)",
            self.n_free_frames
        );
        Ok(())
    }

    /// Take `n` frames starting at `base` out of circulation for good.
    ///
    /// The frames become [`FrameState::Inaccessible`]: search skips them and
    /// they can never be released, which suits holes in physical memory such
    /// as ROM or memory-mapped device ranges. Prior state is overwritten; if
    /// the range cuts an allocated run, the frames after it stay allocated as
    /// a run of their own and can be released from their first frame.
    ///
    /// # Errors
    /// Same as [`mark_inaccessible`](Self::mark_inaccessible).
    pub fn mark_reserved(&mut self, base: FrameNumber, n: usize) -> Result<(), FramePoolError> {
        let start = self.index_of_range(base, n)?;
        if self.self_hosted && start < self.n_info_frames {
            return Err(FramePoolError::BitmapFrame { frame: base });
        }
        if n == 0 {
            return Ok(());
        }

        let mut previously_free = 0;
        let mut previously_allocated = 0;
        for index in start..start + n {
            let state = self.bitmap.get(index);
            if state.is_free() {
                previously_free += 1;
            } else if state.is_allocated() {
                previously_allocated += 1;
            }
            self.bitmap.set(index, FrameState::Inaccessible);
        }

        // Continuation frames cut off from their head start a run of their own.
        let end = start + n;
        if end < self.n_frames && self.bitmap.get(end) == FrameState::Allocated {
            self.bitmap.set(end, FrameState::HeadOfSequence);
        }

        self.n_free_frames -= previously_free;
        if previously_allocated > 0 {
            warn!("Reserved frames {base}..+{n} cover {previously_allocated} allocated frames");
        }
        debug!(
            "Reserved frames {base}..+{n} ({previously_free} were free, {} left free)",
            self.n_free_frames
        );
        Ok(())
    }

    /// Return the run starting at `first` to the pool.
    ///
    /// Frees the head and every continuation frame after it, stopping at the
    /// first frame that is not [`FrameState::Allocated`] or at the pool end.
    /// Returns the number of frames freed.
    ///
    /// # Errors
    /// - [`FramePoolError::FrameOutOfRange`] if `first` is not in this pool.
    /// - [`FramePoolError::BitmapFrame`] for the frame hosting the bitmap.
    /// - [`FramePoolError::NotHeadOfSequence`] if `first` does not start a run;
    ///   nothing is modified.
    pub fn release_frames(&mut self, first: FrameNumber) -> Result<usize, FramePoolError> {
        let start = self.index_of_range(first, 1)?;
        if self.self_hosted && start < self.n_info_frames {
            warn!("Refusing to release bitmap frame {first}");
            return Err(FramePoolError::BitmapFrame { frame: first });
        }

        let state = self.bitmap.get(start);
        if state != FrameState::HeadOfSequence {
            warn!("Refusing to release frame {first}: it is {state}, not a run head");
            return Err(FramePoolError::NotHeadOfSequence {
                frame: first,
                state,
            });
        }

        self.bitmap.set(start, FrameState::Free);
        let mut freed = 1;
        for index in start + 1..self.n_frames {
            if self.bitmap.get(index) != FrameState::Allocated {
                break;
            }
            self.bitmap.set(index, FrameState::Free);
            freed += 1;
        }

        self.n_free_frames += freed;
        trace!("Released {freed} frames at {first}, {} free", self.n_free_frames);
        Ok(freed)
    }

    /// First frame owned by the pool.
    #[inline]
    #[must_use]
    pub const fn base_frame_no(&self) -> FrameNumber {
        self.base_frame_no
    }

    /// One past the last frame owned by the pool.
    #[inline]
    #[must_use]
    pub const fn end_frame_no(&self) -> FrameNumber {
        FrameNumber::new(self.base_frame_no.as_u64() + self.n_frames as u64)
    }

    #[inline]
    #[must_use]
    pub const fn n_frames(&self) -> usize {
        self.n_frames
    }

    #[inline]
    #[must_use]
    pub const fn n_free_frames(&self) -> usize {
        self.n_free_frames
    }

    /// Frame holding the bitmap (the pool base if self-hosted).
    #[inline]
    #[must_use]
    pub const fn info_frame_no(&self) -> FrameNumber {
        self.info_frame_no
    }

    #[inline]
    #[must_use]
    pub const fn n_info_frames(&self) -> usize {
        self.n_info_frames
    }

    #[inline]
    #[must_use]
    pub const fn is_self_hosted(&self) -> bool {
        self.self_hosted
    }

    /// Whether `frame` lies in `[base_frame_no, base_frame_no + n_frames)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        let f = frame.as_u64();
        f >= self.base_frame_no.as_u64() && f < self.end_frame_no().as_u64()
    }

    /// Whether `[base, base + n)` overlaps this pool.
    #[must_use]
    pub const fn overlaps(&self, base: FrameNumber, n: usize) -> bool {
        let start = base.as_u64();
        let end = start.saturating_add(n as u64);
        start < self.end_frame_no().as_u64() && self.base_frame_no.as_u64() < end
    }

    /// State of `frame`, or `None` if the pool does not own it.
    #[must_use]
    pub fn frame_state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.index_of(frame).map(|index| self.bitmap.get(index))
    }

    /// Count the free frames by walking the bitmap.
    ///
    /// Always equal to [`n_free_frames`](Self::n_free_frames); useful for
    /// consistency checks.
    #[must_use]
    pub fn count_free_frames(&self) -> usize {
        self.bitmap.count(FrameState::Free)
    }

    /// Length of the longest run of free frames.
    #[must_use]
    pub fn largest_free_run(&self) -> usize {
        let mut best = 0;
        let mut current = 0;
        for state in self.bitmap.iter() {
            if state.is_free() {
                current += 1;
                best = best.max(current);
            } else {
                current = 0;
            }
        }
        best
    }

    /// Read-only view of the frame-state bitmap.
    #[inline]
    #[must_use]
    pub const fn bitmap(&self) -> &FrameStateBitmap<'a> {
        &self.bitmap
    }

    /// Lowest index starting `n` consecutive free frames.
    fn find_free_run(&self, n: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for index in 0..self.n_frames {
            if !self.bitmap.get(index).is_free() {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == n {
                return Some(run_start);
            }
        }
        None
    }

    #[inline]
    fn frame_at(&self, index: usize) -> FrameNumber {
        self.base_frame_no + index as u64
    }

    fn index_of(&self, frame: FrameNumber) -> Option<usize> {
        if !self.contains(frame) {
            return None;
        }
        usize::try_from(frame - self.base_frame_no).ok()
    }

    /// Index of `first` if `[first, first + n)` lies within the pool.
    fn index_of_range(&self, first: FrameNumber, n: usize) -> Result<usize, FramePoolError> {
        let out_of_range = FramePoolError::FrameOutOfRange { first, count: n };
        let start = self.index_of(first).ok_or(out_of_range)?;
        match start.checked_add(n) {
            Some(end) if end <= self.n_frames => Ok(start),
            _ => Err(out_of_range),
        }
    }
}
