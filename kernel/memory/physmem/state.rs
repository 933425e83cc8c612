// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Tracks the state of each frame in a pool, packed two bits per frame.

use core::fmt;
use core::ops::Range;
use memory::constants::FRAME_SIZE;
use twobit::{StorageTooSmall, TwoBitArray, ENTRIES_PER_BYTE};

/// The number of frame states that fit in a single frame
/// of metadata.
///
pub const STATES_PER_FRAME: usize = FRAME_SIZE * ENTRIES_PER_BYTE;

/// The state of a single frame within a pool.
///
/// Every allocated run starts with a `HeadOfRun` frame,
/// followed by zero or more `Continuation` frames. Runs
/// carry no length; it is recovered by walking forward
/// from the head over `Continuation` frames.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum FrameState {
    /// The frame is available for allocation.
    Free = 0b00,
    /// The frame is the first frame of an allocated run.
    HeadOfRun = 0b01,
    /// The frame is allocated as part of a run, but is
    /// not its first frame.
    Continuation = 0b10,
}

impl FrameState {
    /// Returns the state's two-bit encoding.
    ///
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Decodes a state from its two-bit encoding.
    ///
    /// # Panics
    ///
    /// `from_bits` will panic if `bits` is not the encoding
    /// of a state. The pattern `0b11` is never written, so
    /// reading it means the table has been corrupted.
    ///
    #[inline]
    #[track_caller]
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => FrameState::Free,
            0b01 => FrameState::HeadOfRun,
            0b10 => FrameState::Continuation,
            _ => panic!("corrupt frame state table"),
        }
    }

    /// Returns whether the state marks the frame as in use.
    ///
    #[inline]
    pub const fn is_allocated(self) -> bool {
        !matches!(self, FrameState::Free)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameState::Free => write!(f, "free"),
            FrameState::HeadOfRun => write!(f, "head of run"),
            FrameState::Continuation => write!(f, "continuation"),
        }
    }
}

/// The per-frame state of a pool, indexed relative to
/// the pool's first frame.
///
pub struct StateTable<'storage> {
    states: TwoBitArray<'storage>,
}

impl<'storage> StateTable<'storage> {
    /// Returns the number of bytes needed to track `frames`
    /// frames.
    ///
    pub const fn bytes_needed(frames: usize) -> usize {
        twobit::bytes_needed(frames)
    }

    /// Wraps `storage` as the state of `frames` frames,
    /// all of which start out free. Only the leading
    /// [`bytes_needed`](Self::bytes_needed) bytes of
    /// `storage` are used.
    ///
    pub fn new(storage: &'storage mut [u8], frames: usize) -> Result<Self, StorageTooSmall> {
        let mut states = TwoBitArray::new(storage, frames)?;
        states.fill(FrameState::Free.bits());

        Ok(StateTable { states })
    }

    /// Returns the number of frames in the table.
    ///
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns the state of frame `index`.
    ///
    /// # Panics
    ///
    /// `get` will panic if `index` is out of bounds, or if
    /// the stored state is corrupt.
    ///
    #[track_caller]
    pub fn get(&self, index: usize) -> FrameState {
        FrameState::from_bits(self.states.get(index))
    }

    /// Marks `len` frames starting at `start` as a single
    /// run.
    ///
    /// # Panics
    ///
    /// `mark_run` will panic if `len` is zero or the run
    /// extends past the end of the table.
    ///
    #[track_caller]
    pub fn mark_run(&mut self, start: usize, len: usize) {
        if len == 0 {
            panic!("cannot mark an empty run at frame index {}", start);
        }

        self.states.set(start, FrameState::HeadOfRun.bits());
        self.states
            .fill_range(start + 1..start + len, FrameState::Continuation.bits());
    }

    /// Marks every frame in `range` as free.
    ///
    /// # Panics
    ///
    /// `free_range` will panic if `range` extends past the
    /// end of the table.
    ///
    #[track_caller]
    pub fn free_range(&mut self, range: Range<usize>) {
        self.states.fill_range(range, FrameState::Free.bits());
    }

    /// Returns the number of frames in the given state.
    ///
    pub fn count(&self, state: FrameState) -> usize {
        self.states.count(state.bits())
    }

    /// Returns the first frame index `>= from` in the given
    /// state.
    ///
    pub fn next_in(&self, from: usize, state: FrameState) -> Option<usize> {
        self.states.next_eq(from, state.bits())
    }

    /// Returns the first frame index `>= from` not in the
    /// given state.
    ///
    pub fn next_not_in(&self, from: usize, state: FrameState) -> Option<usize> {
        self.states.next_ne(from, state.bits())
    }

    /// Returns the index just past the run whose head is
    /// at `head`.
    ///
    pub fn run_end(&self, head: usize) -> usize {
        self.next_not_in(head + 1, FrameState::Continuation)
            .unwrap_or_else(|| self.len())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::format;

    #[test]
    fn encoding() {
        assert_eq!(STATES_PER_FRAME, 16384);
        for state in [
            FrameState::Free,
            FrameState::HeadOfRun,
            FrameState::Continuation,
        ] {
            assert_eq!(FrameState::from_bits(state.bits()), state);
        }

        assert_eq!(FrameState::Free.bits(), 0);
        assert!(!FrameState::Free.is_allocated());
        assert!(FrameState::HeadOfRun.is_allocated());
        assert!(FrameState::Continuation.is_allocated());
        assert_eq!(format!("{}", FrameState::HeadOfRun), "head of run");
    }

    #[test]
    #[should_panic(expected = "corrupt frame state table")]
    fn corrupt_state() {
        FrameState::from_bits(0b11);
    }

    #[test]
    fn runs() {
        let mut storage = [0xffu8; 4];
        let mut table = StateTable::new(&mut storage, 13).unwrap();
        assert_eq!(table.len(), 13);
        assert_eq!(table.count(FrameState::Free), 13);

        table.mark_run(2, 5);
        table.mark_run(7, 1);
        assert_eq!(table.get(1), FrameState::Free);
        assert_eq!(table.get(2), FrameState::HeadOfRun);
        assert_eq!(table.get(6), FrameState::Continuation);
        assert_eq!(table.get(7), FrameState::HeadOfRun);
        assert_eq!(table.run_end(2), 7);
        assert_eq!(table.run_end(7), 8);
        assert_eq!(table.next_in(3, FrameState::HeadOfRun), Some(7));
        assert_eq!(table.next_not_in(2, FrameState::Free), Some(2));
        assert_eq!(table.next_in(2, FrameState::Free), Some(8));

        table.mark_run(10, 3);
        assert_eq!(table.run_end(10), 13);
        assert_eq!(table.count(FrameState::Continuation), 6);

        table.free_range(2..7);
        assert_eq!(table.count(FrameState::Free), 9);
        assert_eq!(table.next_not_in(0, FrameState::Free), Some(7));
    }

    #[test]
    fn storage_too_small() {
        let mut storage = [0xffu8; 3];
        assert_eq!(
            StateTable::new(&mut storage, 13).err(),
            Some(StorageTooSmall {
                needed: 4,
                provided: 3
            })
        );
        assert_eq!(storage, [0xff; 3]);

        let mut storage = [0xffu8; 8];
        let table = StateTable::new(&mut storage, 12).unwrap();
        assert_eq!(table.count(FrameState::Free), 12);
        assert_eq!(storage, [0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn bytes_needed() {
        assert_eq!(StateTable::bytes_needed(0), 0);
        assert_eq!(StateTable::bytes_needed(1), 1);
        assert_eq!(StateTable::bytes_needed(16384), 4096);
        assert_eq!(StateTable::bytes_needed(16385), 4097);
    }
}
