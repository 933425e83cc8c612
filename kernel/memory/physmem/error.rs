// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use crate::FrameState;
use memory::{FrameNumber, FrameRange};
use thiserror::Error;

/// An error encountered while constructing or registering
/// a frame pool.
///
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ConstructionError {
    /// The pool would contain no frames.
    #[error("a frame pool must contain at least one frame")]
    ZeroFrames,

    /// The pool or its metadata would extend past the
    /// physical address space.
    #[error("frame range starting at {start} with {len} frames exceeds physical memory")]
    RangeOverflow { start: FrameNumber, len: usize },

    /// The external metadata frames cannot hold the state
    /// of every frame in the pool.
    #[error("pool needs {needed} metadata frames but {provided} were provided")]
    MetadataTooSmall { needed: usize, provided: usize },

    /// The self-hosted metadata would need more frames than
    /// the pool contains.
    #[error("pool of {frame_count} frames cannot host its {needed} metadata frames")]
    MetadataDoesNotFit { needed: usize, frame_count: usize },

    /// The external metadata frames lie within the pool.
    #[error("metadata frames {metadata} overlap the pool's frames {pool}")]
    MetadataOverlapsPool { metadata: FrameRange, pool: FrameRange },

    /// The external metadata frames are free for allocation
    /// in a registered pool.
    #[error("metadata frame {0} is free in its owning pool")]
    MetadataNotReserved(FrameNumber),

    /// The external metadata frames already hold the state
    /// table of a registered pool.
    #[error("metadata frames {metadata} overlap the state table in {existing}")]
    MetadataInUse { metadata: FrameRange, existing: FrameRange },

    /// The pool's frames overlap a registered pool.
    #[error("frames {new} overlap the registered pool {existing}")]
    OverlapsPool { new: FrameRange, existing: FrameRange },

    /// The pool's frames include the external metadata of a
    /// registered pool.
    #[error("frames {new} overlap the metadata frames {metadata} of a registered pool")]
    OverlapsMetadata { new: FrameRange, metadata: FrameRange },
}

/// An error encountered while allocating frames.
///
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum AllocationError {
    /// A run of zero frames was requested.
    #[error("cannot allocate zero frames")]
    ZeroFrames,

    /// No run of the requested length is free.
    #[error("no run of {requested} free frames is available")]
    OutOfFrames { requested: usize },

    /// The pool is not in the registry.
    #[error("unknown frame pool")]
    UnknownPool,
}

/// An error encountered while marking a range of frames
/// inaccessible.
///
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ReservationError {
    /// A range of zero frames was requested.
    #[error("cannot reserve zero frames")]
    ZeroFrames,

    /// The range is not entirely within the pool.
    #[error("frames starting at {start} with {len} frames are outside the pool {pool}")]
    OutOfRange {
        start: FrameNumber,
        len: usize,
        pool: FrameRange,
    },

    /// At least one frame in the range is already in use.
    /// No frames were marked.
    #[error("frame {0} is already in use")]
    RangeNotFree(FrameNumber),

    /// The pool is not in the registry.
    #[error("unknown frame pool")]
    UnknownPool,
}

/// An error encountered while releasing a run of frames.
///
/// Each variant indicates a bug in the caller, such as a
/// double free. No frame states were changed.
///
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ReleaseError {
    /// No registered pool contains the frame.
    #[error("frame {0} is not managed by any frame pool")]
    UnknownFrame(FrameNumber),

    /// The frame is not the first frame of a run.
    #[error("frame {frame} is not the head of a run: frame is {state}")]
    NotAHead { frame: FrameNumber, state: FrameState },

    /// The frame starts the run holding a pool's state
    /// table.
    #[error("frame {0} holds frame pool metadata")]
    MetadataFrame(FrameNumber),
}
