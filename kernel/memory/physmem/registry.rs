// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Tracks every frame pool, so that a frame can be released knowing
//! only its frame number.

use crate::error::{AllocationError, ConstructionError, ReleaseError, ReservationError};
use crate::pool::{validate, FramePool, MetadataLocation};
use alloc::vec::Vec;
use log::{error, info};
use memory::constants::FRAME_SIZE;
use memory::{FrameDeallocator, FrameNumber, FrameRange, PhysMemory};

/// Identifies a pool within a [`PoolRegistry`].
///
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PoolId(usize);

/// The set of frame pools, which resolves a frame number to
/// the pool that manages it.
///
/// Pools are only ever added, never removed, and no two
/// pools share a frame.
///
pub struct PoolRegistry {
    // pools holds each pool, indexed by
    // its PoolId.
    //
    pools: Vec<FramePool>,

    // ranges holds each pool's frames and
    // identity, sorted by first frame.
    //
    ranges: Vec<(FrameRange, PoolId)>,
}

impl PoolRegistry {
    /// Returns an empty registry.
    ///
    pub const fn new() -> Self {
        PoolRegistry {
            pools: Vec::new(),
            ranges: Vec::new(),
        }
    }

    /// Returns the number of registered pools.
    ///
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns whether no pools have been registered.
    ///
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Creates a pool and adds it to the registry. See
    /// [`FramePool::new`] for details of the arguments.
    ///
    /// If the state table is stored in frames belonging to
    /// a registered pool, those frames must already be in
    /// use there. That pool will then refuse to release
    /// them. No two pools may share state table frames.
    ///
    /// # Safety
    ///
    /// The frames holding the state table must be valid
    /// physical memory, reachable through `memory`, and must
    /// not be used for anything else for the remainder of the
    /// kernel's lifetime.
    ///
    pub unsafe fn construct<M: PhysMemory>(
        &mut self,
        memory: &M,
        base_frame: FrameNumber,
        frame_count: usize,
        metadata: MetadataLocation,
    ) -> Result<PoolId, ConstructionError> {
        // Check placement before the pool writes
        // to its state table.
        let (range, metadata_frames) = validate(base_frame, frame_count, metadata)?;
        self.check_placement(range, metadata, metadata_frames)?;

        let pool = FramePool::new(memory, base_frame, frame_count, metadata)?;
        Ok(self.insert(pool))
    }

    /// Adds an existing pool to the registry.
    ///
    pub fn register(&mut self, pool: FramePool) -> Result<PoolId, ConstructionError> {
        self.check_placement(pool.frame_range(), pool.metadata(), pool.metadata_frames())?;
        Ok(self.insert(pool))
    }

    /// Checks that a pool with the given frames and state
    /// table can join the registry.
    ///
    fn check_placement(
        &self,
        range: FrameRange,
        metadata: MetadataLocation,
        metadata_frames: FrameRange,
    ) -> Result<(), ConstructionError> {
        let at = self.ranges.partition_point(|(r, _)| r.end() <= range.start());
        if let Some((existing, _)) = self.ranges.get(at) {
            if existing.overlaps(&range) {
                return Err(ConstructionError::OverlapsPool {
                    new: range,
                    existing: *existing,
                });
            }
        }

        for pool in self.pools.iter() {
            if let MetadataLocation::External(frames) = pool.metadata() {
                if frames.overlaps(&range) {
                    return Err(ConstructionError::OverlapsMetadata {
                        new: range,
                        metadata: frames,
                    });
                }
            }
        }

        if let MetadataLocation::External(_) = metadata {
            for pool in self.pools.iter() {
                let existing = pool.metadata_frames();
                if existing.overlaps(&metadata_frames) {
                    return Err(ConstructionError::MetadataInUse {
                        metadata: metadata_frames,
                        existing,
                    });
                }
            }

            for frame in metadata_frames.frames() {
                let owner = self.owner(frame).map(|id| &self.pools[id.0]);
                if owner.is_some_and(|pool| !pool.is_allocated(frame)) {
                    return Err(ConstructionError::MetadataNotReserved(frame));
                }
            }
        }

        Ok(())
    }

    fn insert(&mut self, pool: FramePool) -> PoolId {
        let id = PoolId(self.pools.len());
        let range = pool.frame_range();
        if let MetadataLocation::External(table) = pool.metadata() {
            for holder in self.pools.iter_mut() {
                if holder.frame_range().overlaps(&table) {
                    holder.hold_table(table);
                }
            }
        }

        let at = self.ranges.partition_point(|(r, _)| r.start() < range.start());
        self.ranges.insert(at, (range, id));
        self.pools.push(pool);

        info!("Registered frame pool {} as pool {}.", range, id.0);

        id
    }

    /// Returns the pool with the given identity.
    ///
    pub fn pool(&self, id: PoolId) -> Option<&FramePool> {
        self.pools.get(id.0)
    }

    /// Returns the pool with the given identity.
    ///
    pub fn pool_mut(&mut self, id: PoolId) -> Option<&mut FramePool> {
        self.pools.get_mut(id.0)
    }

    /// Returns the pool that manages `frame`, or `None`.
    ///
    pub fn owner(&self, frame: FrameNumber) -> Option<PoolId> {
        let at = self.ranges.partition_point(|(r, _)| r.end() <= frame);
        match self.ranges.get(at) {
            Some((range, id)) if range.contains(frame) => Some(*id),
            _ => None,
        }
    }

    /// Allocates `n` contiguous frames from the given pool.
    ///
    pub fn allocate(&mut self, id: PoolId, n: usize) -> Result<FrameNumber, AllocationError> {
        self.pool_mut(id)
            .ok_or(AllocationError::UnknownPool)?
            .allocate(n)
    }

    /// Marks the `n` frames starting at `start` in the given
    /// pool as in use.
    ///
    pub fn mark_inaccessible(
        &mut self,
        id: PoolId,
        start: FrameNumber,
        n: usize,
    ) -> Result<(), ReservationError> {
        self.pool_mut(id)
            .ok_or(ReservationError::UnknownPool)?
            .mark_inaccessible(start, n)
    }

    /// Releases the run of frames starting at `frame`, in
    /// whichever pool manages it. Returns the number of
    /// frames released.
    ///
    pub fn release(&mut self, frame: FrameNumber) -> Result<usize, ReleaseError> {
        let id = match self.owner(frame) {
            Some(id) => id,
            None => {
                let err = ReleaseError::UnknownFrame(frame);
                error!("Cannot release frame: {}.", err);
                return Err(err);
            }
        };

        self.pools[id.0].release(frame)
    }

    /// Returns an iterator over the registered pools, in
    /// ascending order of frame number.
    ///
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &FramePool)> + '_ {
        self.ranges.iter().map(|&(_, id)| (id, &self.pools[id.0]))
    }

    /// Logs information about the state of each pool.
    ///
    pub fn debug(&self) {
        let total: usize = self.pools.iter().map(FramePool::frame_count).sum();
        let free: usize = self.pools.iter().map(FramePool::free_frames).sum();
        info!(
            "Physical memory manager: {}/{} frames available ({} KiB used, {} KiB free).",
            free,
            total,
            (total - free) * FRAME_SIZE / 1024,
            free * FRAME_SIZE / 1024
        );
        for (id, pool) in self.iter() {
            let location = match pool.metadata() {
                MetadataLocation::SelfHosted => "self-hosted",
                MetadataLocation::External(_) => "external",
            };
            info!(
                "Pool {}: frames {} {:5} used {:5} free, {} state table in {}.",
                id.0,
                pool.frame_range(),
                pool.used_frames(),
                pool.free_frames(),
                location,
                pool.metadata_frames()
            );
        }
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        PoolRegistry::new()
    }
}

impl FrameDeallocator for PoolRegistry {
    /// Releases the run of frames starting at `first`.
    ///
    /// # Panics
    ///
    /// `deallocate_frames` will panic if `first` is not the
    /// head of an allocated run in a registered pool.
    ///
    unsafe fn deallocate_frames(&mut self, first: FrameNumber) {
        if let Err(err) = self.release(first) {
            panic!("cannot deallocate frames at {}: {}", first, err);
        }
    }
}
