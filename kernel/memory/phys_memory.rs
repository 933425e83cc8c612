// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use crate::constants::PHYSICAL_MEMORY_OFFSET;
use crate::FrameNumber;

/// A trait for types that give the kernel access to the
/// contents of physical memory frames.
///
/// # Safety
///
/// This trait is unsafe, as each implementation must
/// ensure that the pointer returned for a frame can be
/// used to read and write the frame's bytes, and that
/// consecutive frames are mapped at consecutive
/// addresses.
///
pub unsafe trait PhysMemory {
    /// Returns a pointer to the first byte of the
    /// given frame.
    ///
    fn frame_ptr(&self, frame: FrameNumber) -> *mut u8;
}

/// Access to physical memory through a direct mapping
/// of all physical memory at a fixed virtual offset.
///
/// The kernel maps all physical memory contiguously at
/// [`PHYSICAL_MEMORY_OFFSET`], which [`DirectMap::kernel`]
/// uses. Other offsets allow a buffer to stand in for a
/// region of physical memory.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DirectMap {
    offset: usize,
}

impl DirectMap {
    /// Returns a mapping that places physical address
    /// zero at virtual address `offset`.
    ///
    #[inline]
    pub const fn new(offset: usize) -> Self {
        DirectMap { offset }
    }

    /// Returns the kernel's mapping of all physical
    /// memory.
    ///
    #[inline]
    pub const fn kernel() -> Self {
        DirectMap::new(PHYSICAL_MEMORY_OFFSET)
    }

    /// Returns the virtual address at which physical
    /// address zero is mapped.
    ///
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

unsafe impl PhysMemory for DirectMap {
    #[inline]
    fn frame_ptr(&self, frame: FrameNumber) -> *mut u8 {
        self.offset.wrapping_add(frame.start_address().as_usize()) as *mut u8
    }
}
