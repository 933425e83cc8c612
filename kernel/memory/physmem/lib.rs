// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Physical memory management and allocation.
//!
//! Physical memory is divided into [`FramePool`]s, each of which manages
//! a fixed range of frames and allocates contiguous runs from it. Each
//! pool tracks the state of its frames in a packed table of two
//! bits per frame, stored either in the pool's own leading frames or in
//! frames allocated from another pool.
//!
//! A run is released using only its first frame. The [`PoolRegistry`]
//! finds the pool managing that frame, which recovers the run's length
//! from the frame states and frees it.
//!
//! ## Helper functions
//!
//! While the registry can be used directly via [`REGISTRY`](struct@REGISTRY),
//! the [`construct`], [`allocate`], [`allocate_frame`], [`mark_inaccessible`],
//! and [`release`] helper functions are typically easier to use. The [`debug`]
//! function can be used to log information about each pool's state.
//!
//! # Examples
//!
//! ```no_run
//! use memory::DirectMap;
//!
//! // Set up the kernel and process pools.
//! let pools = unsafe { physmem::init(&DirectMap::kernel()) }.unwrap();
//!
//! // Allocate four contiguous frames for a process.
//! let frame = physmem::allocate(pools.process, 4).unwrap();
//!
//! // Release them again, knowing only the first frame.
//! assert_eq!(physmem::release(frame), Ok(4));
//! ```

#![no_std]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

extern crate alloc;

mod error;
mod layout;
mod pool;
mod registry;
mod state;

pub use crate::error::{AllocationError, ConstructionError, ReleaseError, ReservationError};
pub use crate::layout::{InitError, StandardPools};
pub use crate::pool::{needed_metadata_frames, FramePool, MetadataLocation, Runs};
pub use crate::registry::{PoolId, PoolRegistry};
pub use crate::state::{FrameState, STATES_PER_FRAME};
use lazy_static::lazy_static;
use memory::{FrameNumber, PhysMemory};
use spin::Mutex;

lazy_static! {
    /// The set of all frame pools.
    ///
    /// `REGISTRY` is populated by calling [`init`], or by
    /// constructing pools with [`construct`].
    ///
    pub static ref REGISTRY: Mutex<PoolRegistry> = Mutex::new(PoolRegistry::new());
}

/// Sets up the reference layout of frame pools in
/// [`REGISTRY`](struct@REGISTRY).
///
/// See [`StandardPools::build`] for details.
///
/// # Safety
///
/// All frames in the kernel and process pools must be
/// valid physical memory, reachable through `memory`,
/// and must not be used by anything else.
///
pub unsafe fn init<M: PhysMemory>(memory: &M) -> Result<StandardPools, InitError> {
    let mut registry = REGISTRY.lock();
    StandardPools::build(&mut registry, memory)
}

/// Creates a frame pool and adds it to
/// [`REGISTRY`](struct@REGISTRY).
///
/// # Safety
///
/// The frames holding the state table must be valid
/// physical memory, reachable through `memory`, and
/// must not be used for anything else for the remainder
/// of the kernel's lifetime.
///
pub unsafe fn construct<M: PhysMemory>(
    memory: &M,
    base_frame: FrameNumber,
    frame_count: usize,
    metadata: MetadataLocation,
) -> Result<PoolId, ConstructionError> {
    let mut registry = REGISTRY.lock();
    registry.construct(memory, base_frame, frame_count, metadata)
}

/// Returns the first of `n` contiguous frames allocated
/// from the given pool.
///
pub fn allocate(pool: PoolId, n: usize) -> Result<FrameNumber, AllocationError> {
    let mut registry = REGISTRY.lock();
    registry.allocate(pool, n)
}

/// Returns a single frame allocated from the given pool.
///
pub fn allocate_frame(pool: PoolId) -> Result<FrameNumber, AllocationError> {
    allocate(pool, 1)
}

/// Marks the `n` frames starting at `start` in the given
/// pool as in use, so they will never be allocated.
///
pub fn mark_inaccessible(
    pool: PoolId,
    start: FrameNumber,
    n: usize,
) -> Result<(), ReservationError> {
    let mut registry = REGISTRY.lock();
    registry.mark_inaccessible(pool, start, n)
}

/// Releases the run of frames starting at `frame`,
/// returning the number of frames released.
///
pub fn release(frame: FrameNumber) -> Result<usize, ReleaseError> {
    let mut registry = REGISTRY.lock();
    registry.release(frame)
}

/// Logs debug information about the physical memory
/// manager.
///
pub fn debug() {
    let registry = REGISTRY.lock();
    registry.debug();
}
