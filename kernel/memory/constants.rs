// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Contains constants describing the physical memory layout.
//!
//! - [`FRAME_SIZE`]: The size in bytes of every frame of physical memory.
//! - [`PHYSICAL_MEMORY_OFFSET`]: The virtual address at which all physical memory is mapped.
//!
//! The reference machine's physical memory is divided into frame pools as follows:
//!
//! - [`KERNEL_POOL`]: Frames for kernel data structures, including the other pools' metadata.
//! - [`PROCESS_POOL`]: Frames handed out to processes.
//! - [`MEMORY_HOLE`]: A range inside the process pool with no memory behind it.
//!
//! | Region             | Start address | Last address | First frame | Frames |   Size |
//! | ------------------ | ------------: | -----------: | ----------: | -----: | -----: |
//! | (unmanaged)        |         `0x0` |   `0x1f_ffff` |          0 |    512 |  2 MiB |
//! | [`KERNEL_POOL`]    |   `0x20_0000` |   `0x3f_ffff` |        512 |    512 |  2 MiB |
//! | [`PROCESS_POOL`]   |   `0x40_0000` |  `0x1ff_ffff` |       1024 |   7168 | 28 MiB |
//! | [`MEMORY_HOLE`]    |   `0xf0_0000` |   `0xff_ffff` |       3840 |    256 |  1 MiB |

use crate::{FrameNumber, FrameRange};

/// The size in bytes of a frame of physical memory.
///
pub const FRAME_SIZE: usize = 4096;

/// The virtual address at which all physical memory is mapped.
///
pub const PHYSICAL_MEMORY_OFFSET: usize = 0xffff_8000_8000_0000;

const MIB: usize = 1 << 20;

/// The frames managed by the kernel's frame pool.
///
pub const KERNEL_POOL: FrameRange =
    FrameRange::new(FrameNumber::new(2 * MIB / FRAME_SIZE), 2 * MIB / FRAME_SIZE);

/// The frames managed by the process frame pool.
///
pub const PROCESS_POOL: FrameRange =
    FrameRange::new(FrameNumber::new(4 * MIB / FRAME_SIZE), 28 * MIB / FRAME_SIZE);

/// The frames with no physical memory behind them.
///
pub const MEMORY_HOLE: FrameRange =
    FrameRange::new(FrameNumber::new(15 * MIB / FRAME_SIZE), MIB / FRAME_SIZE);
