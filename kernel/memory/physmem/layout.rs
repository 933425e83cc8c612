// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Builds the reference machine's frame pools.

use crate::error::{AllocationError, ConstructionError, ReservationError};
use crate::pool::{needed_metadata_frames, MetadataLocation};
use crate::registry::{PoolId, PoolRegistry};
use log::info;
use memory::constants::{KERNEL_POOL, MEMORY_HOLE, PROCESS_POOL};
use memory::{FrameRange, PhysMemory};
use thiserror::Error;

/// The pools making up the reference memory layout.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StandardPools {
    /// The kernel's pool, which hosts its own state table.
    pub kernel: PoolId,
    /// The process pool, whose state table is allocated
    /// from the kernel pool.
    pub process: PoolId,
}

/// An error encountered while building the reference memory
/// layout.
///
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum InitError {
    /// The kernel or process pool could not be constructed.
    #[error("failed to construct frame pool: {0}")]
    Construction(#[from] ConstructionError),

    /// The kernel pool had no room for the process pool's
    /// state table.
    #[error("failed to allocate process pool metadata: {0}")]
    Allocation(#[from] AllocationError),

    /// The memory hole could not be marked inaccessible.
    #[error("failed to reserve the memory hole: {0}")]
    Reservation(#[from] ReservationError),
}

impl StandardPools {
    /// Adds the kernel and process pools to `registry`.
    ///
    /// The kernel pool covers [`KERNEL_POOL`] and stores its
    /// state table in its own first frame. The process pool
    /// covers [`PROCESS_POOL`], with its state table in frames
    /// allocated from the kernel pool. The [`MEMORY_HOLE`] is
    /// then marked inaccessible in the process pool.
    ///
    /// # Safety
    ///
    /// All frames in [`KERNEL_POOL`] and [`PROCESS_POOL`] must
    /// be valid physical memory, reachable through `memory`,
    /// and must not be used by anything else.
    ///
    pub unsafe fn build<M: PhysMemory>(
        registry: &mut PoolRegistry,
        memory: &M,
    ) -> Result<Self, InitError> {
        let kernel = registry.construct(
            memory,
            KERNEL_POOL.start(),
            KERNEL_POOL.len(),
            MetadataLocation::SelfHosted,
        )?;

        let info_frames = needed_metadata_frames(PROCESS_POOL.len());
        let info = registry.allocate(kernel, info_frames)?;
        let process = registry.construct(
            memory,
            PROCESS_POOL.start(),
            PROCESS_POOL.len(),
            MetadataLocation::External(FrameRange::new(info, info_frames)),
        )?;

        registry.mark_inaccessible(process, MEMORY_HOLE.start(), MEMORY_HOLE.len())?;
        info!("Marked memory hole {} inaccessible.", MEMORY_HOLE);

        Ok(StandardPools { kernel, process })
    }
}
