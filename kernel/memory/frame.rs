// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use crate::constants::FRAME_SIZE;
use crate::PhysAddr;
use core::fmt;
use core::ops::Add;

/// The absolute number of a frame of physical memory.
///
/// Frame `n` starts at physical address `n * FRAME_SIZE`.
/// Frame zero is an ordinary frame and can be allocated
/// like any other.
///
#[repr(transparent)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameNumber(usize);

impl FrameNumber {
    /// Returns the frame with the given number.
    ///
    #[inline]
    pub const fn new(n: usize) -> Self {
        FrameNumber(n)
    }

    /// Returns the frame's numerical value.
    ///
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the first address in the frame.
    ///
    /// # Panics
    ///
    /// `start_address` will panic if the frame lies
    /// beyond the physical address space.
    ///
    #[inline]
    #[track_caller]
    pub const fn start_address(self) -> PhysAddr {
        match self.0.checked_mul(FRAME_SIZE) {
            Some(addr) => PhysAddr::new(addr),
            None => panic!("frame number beyond the physical address space"),
        }
    }

    /// Returns the frame `rhs` frames after this one,
    /// or `None` on overflow.
    ///
    #[inline]
    pub const fn checked_add(self, rhs: usize) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(n) => Some(FrameNumber(n)),
            None => None,
        }
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FrameNumber({})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add<usize> for FrameNumber {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn add(self, rhs: usize) -> Self::Output {
        match self.checked_add(rhs) {
            Some(frame) => frame,
            None => panic!("frame number overflow: {} + {}", self.0, rhs),
        }
    }
}

/// A half-open range of contiguous physical memory
/// frames, `[start, start + len)`.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct FrameRange {
    start: FrameNumber,
    len: usize,
}

impl FrameRange {
    /// Returns the range of `len` frames starting at
    /// `start`.
    ///
    /// # Panics
    ///
    /// `new` will panic if the range would extend past
    /// the largest frame number.
    ///
    #[inline]
    #[track_caller]
    pub const fn new(start: FrameNumber, len: usize) -> Self {
        match Self::try_new(start, len) {
            Some(range) => range,
            None => panic!("frame range overflows the frame number space"),
        }
    }

    /// Returns the range of `len` frames starting at
    /// `start`, or `None` if the range would extend
    /// past the largest frame number.
    ///
    #[inline]
    pub const fn try_new(start: FrameNumber, len: usize) -> Option<Self> {
        match start.checked_add(len) {
            Some(_) => Some(FrameRange { start, len }),
            None => None,
        }
    }

    /// Returns the first frame in the range.
    ///
    #[inline]
    pub const fn start(&self) -> FrameNumber {
        self.start
    }

    /// Returns the first frame after the range.
    ///
    #[inline]
    pub const fn end(&self) -> FrameNumber {
        FrameNumber(self.start.0 + self.len)
    }

    /// Returns the number of frames in the range.
    ///
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the range contains no frames.
    ///
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns whether `frame` lies within the range.
    ///
    #[inline]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        self.start.0 <= frame.0 && frame.0 < self.end().0
    }

    /// Returns whether the two ranges share at least
    /// one frame.
    ///
    #[inline]
    pub const fn overlaps(&self, other: &FrameRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start.0 < other.end().0
            && other.start.0 < self.end().0
    }

    /// Returns the index of `frame` within the range,
    /// or `None` if the range does not contain it.
    ///
    #[inline]
    pub const fn index_of(&self, frame: FrameNumber) -> Option<usize> {
        if self.contains(frame) {
            Some(frame.0 - self.start.0)
        } else {
            None
        }
    }

    /// Returns an iterator over the frames in the
    /// range, in ascending order.
    ///
    #[inline]
    pub fn frames(&self) -> impl Iterator<Item = FrameNumber> {
        (self.start.0..self.end().0).map(FrameNumber)
    }
}

impl fmt::Debug for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameRange")
            .field("start", &self.start.0)
            .field("end", &self.end().0)
            .finish()
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

#[cfg(test)]
mod test {
    extern crate std;
    use super::*;
    use std::format;
    use std::vec::Vec;

    #[test]
    fn test_frame_number() {
        let frame = FrameNumber::new(0x1234_5678_9);
        assert_eq!(frame.start_address(), PhysAddr::new(0x1234_5678_9000_usize));
        assert_eq!(frame + 1, FrameNumber::new(0x1234_5678_a));
        assert_eq!(FrameNumber::new(usize::MAX).checked_add(1), None);
        assert_eq!(FrameNumber::new(0).start_address().as_usize(), 0);

        let frame = FrameNumber::new(10) + 5;
        assert_eq!(frame.as_usize(), 15);
        assert_eq!(format!("{}", frame), "15");
    }

    #[test]
    fn test_frame_range() {
        let range = FrameRange::new(FrameNumber::new(16), 4);
        assert_eq!(range.start(), FrameNumber::new(16));
        assert_eq!(range.end(), FrameNumber::new(20));
        assert_eq!(range.len(), 4);
        assert!(!range.is_empty());
        assert!(!range.contains(FrameNumber::new(15)));
        assert!(range.contains(FrameNumber::new(16)));
        assert!(range.contains(FrameNumber::new(19)));
        assert!(!range.contains(FrameNumber::new(20)));
        assert_eq!(range.index_of(FrameNumber::new(18)), Some(2));
        assert_eq!(range.index_of(FrameNumber::new(20)), None);
        assert_eq!(
            range.frames().map(FrameNumber::as_usize).collect::<Vec<_>>(),
            [16, 17, 18, 19]
        );
        assert_eq!(format!("{}", range), "[16, 20)");

        // Overlap is symmetric and ignores
        // ranges that merely touch.
        let before = FrameRange::new(FrameNumber::new(12), 4);
        let inside = FrameRange::new(FrameNumber::new(17), 1);
        let across = FrameRange::new(FrameNumber::new(19), 8);
        let empty = FrameRange::new(FrameNumber::new(17), 0);
        assert!(!range.overlaps(&before));
        assert!(!before.overlaps(&range));
        assert!(range.overlaps(&inside));
        assert!(inside.overlaps(&range));
        assert!(range.overlaps(&across));
        assert!(across.overlaps(&range));
        assert!(!range.overlaps(&empty));

        assert_eq!(FrameRange::try_new(FrameNumber::new(usize::MAX), 2), None);
        assert!(FrameRange::try_new(FrameNumber::new(usize::MAX - 2), 2).is_some());
    }
}
