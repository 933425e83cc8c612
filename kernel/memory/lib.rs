// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Contains types and functionality to represent physical memory frames.
//!
//! From most basic to most sophisticated, the types are:
//!
//! - [`PhysAddr`]: An address in the 52-bit physical address space.
//! - [`FrameNumber`]: The absolute number of a [`FRAME_SIZE`](constants::FRAME_SIZE)
//!   frame of physical memory.
//! - [`FrameRange`]: A half-open sequence of contiguous frames.
//!
//! The [`PhysMemory`] trait describes how the kernel reaches the contents of
//! a frame. The kernel's page tables map all physical memory contiguously at
//! [`PHYSICAL_MEMORY_OFFSET`](constants::PHYSICAL_MEMORY_OFFSET), which
//! [`DirectMap::kernel`] uses to implement [`PhysMemory`].
//!
//! The [`FrameAllocator`] and [`FrameDeallocator`] traits can be used to
//! abstract the management of physical memory, such as by page table code
//! that needs frames for new tables.
//!
//! The [`constants`] module contains the frame size and the reference
//! physical memory layout.

#![no_std]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

pub mod constants;
mod frame;
mod phys_addr;
mod phys_memory;

pub use frame::{FrameNumber, FrameRange};
pub use phys_addr::{InvalidPhysAddr, PhysAddr};
pub use phys_memory::{DirectMap, PhysMemory};

/// A trait for types that can
/// allocate contiguous frames of
/// physical memory.
///
/// # Safety
///
/// This trait is unsafe, as each
/// implementation must ensure
/// that it only returns frames
/// that are unused.
///
pub unsafe trait FrameAllocator {
    /// Allocate `n` contiguous frames
    /// and return the first, if
    /// possible.
    ///
    fn allocate_frames(&mut self, n: usize) -> Option<FrameNumber>;

    /// Allocate a single frame, if
    /// possible.
    ///
    fn allocate_frame(&mut self) -> Option<FrameNumber> {
        self.allocate_frames(1)
    }
}

/// A trait for types that can
/// deallocate frames of physical
/// memory.
///
pub trait FrameDeallocator {
    /// Deallocate the run of frames
    /// starting at `first`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that
    /// none of the frames in the run
    /// are still in use.
    ///
    unsafe fn deallocate_frames(&mut self, first: FrameNumber);
}
