use crate::frame::FrameNumber;
use crate::frame_state::FrameState;

/// Precondition violations reported by a frame pool.
///
/// None of these are expected at runtime: they indicate a boot-time
/// configuration error or a caller that broke the allocation protocol. A
/// kernel will usually treat them as fatal. Running out of *contiguous* space
/// is not an error; [`ContFramePool::get_frames`](crate::ContFramePool::get_frames)
/// returns `Ok(None)` for that.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramePoolError {
    #[error("pool of {n_frames} frames exceeds the {max}-frame pool limit")]
    PoolTooLarge { n_frames: usize, max: usize },
    #[error("pool size {n_frames} is not a multiple of 8 frames")]
    PoolNotMultipleOfEight { n_frames: usize },
    #[error("pool must own at least one frame")]
    EmptyPool,
    #[error("bitmap for {n_frames} frames needs {needed} info frames, got {provided}")]
    InfoFramesTooSmall {
        n_frames: usize,
        needed: usize,
        provided: usize,
    },
    #[error("request for {requested} frames with only {free} free frames")]
    InsufficientFreeFrames { requested: usize, free: usize },
    #[error("request for zero frames")]
    EmptyRequest,
    #[error("frames {first}..+{count} lie outside the pool")]
    FrameOutOfRange { first: FrameNumber, count: usize },
    #[error("frame {frame} is {state}, not the head of a sequence")]
    NotHeadOfSequence { frame: FrameNumber, state: FrameState },
    #[error("frame {frame} holds the pool's own bitmap")]
    BitmapFrame { frame: FrameNumber },
    #[error("no registered pool owns frame {frame}")]
    NoOwningPool { frame: FrameNumber },
}

/// Errors raised while adding a pool to a [`FramePoolRegistry`](crate::FramePoolRegistry).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is full ({capacity} pools)")]
    Full { capacity: usize },
    #[error("pool at frame {base} overlaps the pool at frame {existing}")]
    Overlap {
        base: FrameNumber,
        existing: FrameNumber,
    },
    #[error(transparent)]
    Pool(#[from] FramePoolError),
}
