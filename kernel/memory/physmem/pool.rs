// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Provides a frame pool, which allocates contiguous runs of frames
//! from a fixed range of physical memory.

use crate::error::{AllocationError, ConstructionError, ReleaseError, ReservationError};
use crate::state::{FrameState, StateTable, STATES_PER_FRAME};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;
use core::slice;
use log::{debug, error, info, warn};
use memory::constants::FRAME_SIZE;
use memory::{FrameAllocator, FrameNumber, FrameRange, PhysAddr, PhysMemory};

/// Returns the number of frames of metadata needed to track
/// the state of `frames` frames.
///
pub const fn needed_metadata_frames(frames: usize) -> usize {
    frames.div_ceil(STATES_PER_FRAME)
}

/// Where a pool stores its state table.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetadataLocation {
    /// The table occupies the pool's leading frames,
    /// which are reserved when the pool is constructed.
    SelfHosted,

    /// The table occupies the given frames, which the
    /// caller has already reserved elsewhere, usually
    /// by allocating them from another pool.
    External(FrameRange),
}

/// Checks the sizing of a prospective pool, returning the
/// pool's frames and the frames that will hold its state
/// table.
///
pub(crate) fn validate(
    base_frame: FrameNumber,
    frame_count: usize,
    metadata: MetadataLocation,
) -> Result<(FrameRange, FrameRange), ConstructionError> {
    if frame_count == 0 {
        return Err(ConstructionError::ZeroFrames);
    }

    let range = addressable(base_frame, frame_count)?;
    let needed = needed_metadata_frames(frame_count);
    let metadata = match metadata {
        MetadataLocation::SelfHosted => {
            if needed > frame_count {
                return Err(ConstructionError::MetadataDoesNotFit {
                    needed,
                    frame_count,
                });
            }

            FrameRange::new(base_frame, needed)
        }
        MetadataLocation::External(frames) => {
            if frames.len() < needed {
                return Err(ConstructionError::MetadataTooSmall {
                    needed,
                    provided: frames.len(),
                });
            }

            if frames.overlaps(&range) {
                return Err(ConstructionError::MetadataOverlapsPool {
                    metadata: frames,
                    pool: range,
                });
            }

            addressable(frames.start(), frames.len())?
        }
    };

    Ok((range, metadata))
}

/// Returns the given range if every frame in it lies within
/// the physical address space.
///
fn addressable(start: FrameNumber, len: usize) -> Result<FrameRange, ConstructionError> {
    let overflow = ConstructionError::RangeOverflow { start, len };
    let range = FrameRange::try_new(start, len).ok_or(overflow)?;
    let last = range.end().as_usize().saturating_sub(1);
    match last.checked_mul(FRAME_SIZE).map(PhysAddr::try_new) {
        Some(Ok(_)) => Ok(range),
        _ => Err(overflow),
    }
}

/// A fixed range of physical memory frames, from which runs
/// of contiguous frames can be allocated and released.
///
/// The state of each frame is tracked in a packed table of
/// two bits per frame. The table lives in physical memory,
/// either in the pool's own leading frames or in frames the
/// caller has set aside.
///
pub struct FramePool {
    // range is the set of frames managed
    // by the pool.
    //
    range: FrameRange,

    // free_frames is the number of frames in
    // the pool that are free. There is no
    // guarantee that the free frames will be
    // consecutive.
    //
    free_frames: usize,

    // metadata records where the state table
    // was placed.
    //
    metadata: MetadataLocation,

    // metadata_frames is the set of frames
    // holding the state table.
    //
    metadata_frames: FrameRange,

    // tables holds the frames in range that
    // store a state table, either this pool's
    // own or another pool's. They are never
    // released.
    //
    tables: Vec<FrameRange>,

    // states holds one state for each frame
    // in range, in order.
    //
    states: StateTable<'static>,
}

impl FramePool {
    /// Creates a pool of `frame_count` frames starting at
    /// `base_frame`, with its state table at `metadata`.
    ///
    /// Every frame starts out free, except the leading frames
    /// of a self-hosted pool, which are marked as a single run
    /// holding the state table.
    ///
    /// # Safety
    ///
    /// The frames holding the state table must be valid
    /// physical memory, reachable through `memory`, and must
    /// not be used for anything else for the remainder of the
    /// kernel's lifetime.
    ///
    pub unsafe fn new<M: PhysMemory>(
        memory: &M,
        base_frame: FrameNumber,
        frame_count: usize,
        metadata: MetadataLocation,
    ) -> Result<Self, ConstructionError> {
        let (range, metadata_frames) = validate(base_frame, frame_count, metadata)?;
        let needed = needed_metadata_frames(frame_count);
        let table = memory.frame_ptr(metadata_frames.start());
        let storage = slice::from_raw_parts_mut(table, metadata_frames.len() * FRAME_SIZE);
        let mut states = StateTable::new(storage, frame_count).map_err(|err| {
            ConstructionError::MetadataTooSmall {
                needed,
                provided: err.provided / FRAME_SIZE,
            }
        })?;

        let mut free_frames = frame_count;
        let mut tables = Vec::new();
        if metadata == MetadataLocation::SelfHosted {
            states.mark_run(0, needed);
            free_frames -= needed;
            tables = vec![metadata_frames];
        }

        info!(
            "Frame pool {}: {} frames, state table in frames {}.",
            range, frame_count, metadata_frames
        );

        Ok(FramePool {
            range,
            free_frames,
            metadata,
            metadata_frames,
            tables,
            states,
        })
    }

    /// Returns the first frame in the pool.
    ///
    pub fn base_frame(&self) -> FrameNumber {
        self.range.start()
    }

    /// Returns the number of frames in the pool.
    ///
    pub fn frame_count(&self) -> usize {
        self.range.len()
    }

    /// Returns the frames managed by the pool.
    ///
    pub fn frame_range(&self) -> FrameRange {
        self.range
    }

    /// Returns the number of free frames in the pool. The
    /// free frames are not necessarily contiguous.
    ///
    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    /// Returns the number of frames in use.
    ///
    pub fn used_frames(&self) -> usize {
        self.range.len() - self.free_frames
    }

    /// Returns where the pool's state table is stored.
    ///
    pub fn metadata(&self) -> MetadataLocation {
        self.metadata
    }

    /// Returns the frames holding the pool's state table.
    ///
    pub fn metadata_frames(&self) -> FrameRange {
        self.metadata_frames
    }

    /// Returns whether `frame` is managed by the pool.
    ///
    pub fn contains(&self, frame: FrameNumber) -> bool {
        self.range.contains(frame)
    }

    /// Returns the state of `frame`, or `None` if the frame
    /// is not managed by the pool.
    ///
    pub fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.range.index_of(frame).map(|i| self.states.get(i))
    }

    /// Returns whether `frame` is in use.
    ///
    /// # Panics
    ///
    /// `is_allocated` will panic if `frame` is not managed
    /// by the pool.
    ///
    #[track_caller]
    pub fn is_allocated(&self, frame: FrameNumber) -> bool {
        match self.state(frame) {
            Some(state) => state.is_allocated(),
            None => panic!("frame {} not tracked by pool {}", frame, self.range),
        }
    }

    /// Records that `frames` hold a state table, so the
    /// run containing them must not be released.
    ///
    pub(crate) fn hold_table(&mut self, frames: FrameRange) {
        self.tables.push(frames);
    }

    /// Returns whether any of the frames in `range` hold a
    /// state table.
    ///
    fn holds_table(&self, range: FrameRange) -> bool {
        self.tables.iter().any(|table| table.overlaps(&range))
    }

    /// Returns the run whose first frame is `frame`, or
    /// `None` if `frame` is not the head of a run.
    ///
    pub fn run(&self, frame: FrameNumber) -> Option<FrameRange> {
        let index = self.range.index_of(frame)?;
        match self.states.get(index) {
            FrameState::HeadOfRun => {
                let end = self.states.run_end(index);
                Some(FrameRange::new(frame, end - index))
            }
            _ => None,
        }
    }

    /// Allocates a run of `n` contiguous frames and returns
    /// the first.
    ///
    /// The lowest-numbered run of `n` free frames is chosen.
    /// If no such run exists, no frames are changed.
    ///
    pub fn allocate(&mut self, n: usize) -> Result<FrameNumber, AllocationError> {
        if n == 0 {
            return Err(AllocationError::ZeroFrames);
        }

        let index = match self.find_free_run(n) {
            Some(index) => index,
            None => {
                warn!(
                    "Frame pool {}: no run of {} free frames ({} frames free).",
                    self.range, n, self.free_frames
                );
                return Err(AllocationError::OutOfFrames { requested: n });
            }
        };

        self.states.mark_run(index, n);
        self.free_frames -= n;

        let head = self.range.start() + index;
        debug!("Frame pool {}: allocated {} frames at {}.", self.range, n, head);

        Ok(head)
    }

    /// Allocates a single frame.
    ///
    pub fn allocate_frame(&mut self) -> Result<FrameNumber, AllocationError> {
        self.allocate(1)
    }

    /// Returns the index of the first run of `n` free frames.
    ///
    fn find_free_run(&self, n: usize) -> Option<usize> {
        if n > self.free_frames {
            return None;
        }

        let len = self.states.len();
        let mut from = 0;
        loop {
            let start = self.states.next_in(from, FrameState::Free)?;
            let end = start.checked_add(n).filter(|&end| end <= len)?;
            match self.states.next_not_in(start, FrameState::Free) {
                Some(used) if used < end => from = used,
                _ => return Some(start),
            }
        }
    }

    /// Marks the `n` frames starting at `start` as a single
    /// run, so that they will not be allocated.
    ///
    /// If any of the frames is already in use, no frames are
    /// changed and [`ReservationError::RangeNotFree`] is
    /// returned.
    ///
    pub fn mark_inaccessible(
        &mut self,
        start: FrameNumber,
        n: usize,
    ) -> Result<(), ReservationError> {
        if n == 0 {
            return Err(ReservationError::ZeroFrames);
        }

        let out_of_range = ReservationError::OutOfRange {
            start,
            len: n,
            pool: self.range,
        };
        let index = self.range.index_of(start).ok_or(out_of_range)?;
        let end = index
            .checked_add(n)
            .filter(|&end| end <= self.states.len())
            .ok_or(out_of_range)?;

        if let Some(used) = self.states.next_not_in(index, FrameState::Free) {
            if used < end {
                return Err(ReservationError::RangeNotFree(self.range.start() + used));
            }
        }

        self.states.mark_run(index, n);
        self.free_frames -= n;
        debug!(
            "Frame pool {}: marked {} frames at {} inaccessible.",
            self.range, n, start
        );

        Ok(())
    }

    /// Releases the run of frames starting at `frame`,
    /// returning the number of frames released.
    ///
    /// The run's length is recovered by walking forward
    /// from `frame` over its continuation frames.
    ///
    pub fn release(&mut self, frame: FrameNumber) -> Result<usize, ReleaseError> {
        let result = self.release_run(frame);
        if let Err(err) = result {
            error!("Frame pool {}: cannot release: {}.", self.range, err);
        }

        result
    }

    fn release_run(&mut self, frame: FrameNumber) -> Result<usize, ReleaseError> {
        let index = self
            .range
            .index_of(frame)
            .ok_or(ReleaseError::UnknownFrame(frame))?;

        match self.states.get(index) {
            FrameState::HeadOfRun => {}
            state => return Err(ReleaseError::NotAHead { frame, state }),
        }

        let end = self.states.run_end(index);
        let len = end - index;
        if self.holds_table(FrameRange::new(frame, len)) {
            return Err(ReleaseError::MetadataFrame(frame));
        }

        self.states.free_range(index..end);
        self.free_frames += len;
        debug_assert_eq!(self.states.count(FrameState::Free), self.free_frames);
        debug!("Frame pool {}: released {} frames at {}.", self.range, len, frame);

        Ok(len)
    }

    /// Returns an iterator over the allocated runs in the
    /// pool, in ascending order.
    ///
    pub fn runs(&self) -> Runs<'_> {
        Runs { pool: self, next: 0 }
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("range", &self.range)
            .field("free_frames", &self.free_frames)
            .field("metadata", &self.metadata)
            .field("tables", &self.tables)
            .finish()
    }
}

unsafe impl FrameAllocator for FramePool {
    /// Allocates `n` contiguous frames and returns
    /// the first, or `None`.
    ///
    fn allocate_frames(&mut self, n: usize) -> Option<FrameNumber> {
        self.allocate(n).ok()
    }
}

/// An iterator over the allocated runs in a [`FramePool`].
///
/// Runs are returned in ascending order, as returned by
/// [`FramePool::runs`].
///
pub struct Runs<'pool> {
    pool: &'pool FramePool,
    next: usize,
}

impl<'pool> Iterator for Runs<'pool> {
    type Item = FrameRange;

    fn next(&mut self) -> Option<Self::Item> {
        let states = &self.pool.states;
        let head = match states.next_in(self.next, FrameState::HeadOfRun) {
            Some(head) => head,
            None => {
                self.next = states.len();
                return None;
            }
        };

        let end = states.run_end(head);
        self.next = end;

        Some(FrameRange::new(self.pool.range.start() + head, end - head))
    }
}

impl FusedIterator for Runs<'_> {}
