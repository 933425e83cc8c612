// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements a packed array of two-bit values, backed by a caller-supplied
//! byte slice.
//!
//! This crate can be used to track a small state machine (up to four states)
//! for an arbitrary number of sequential items without any heap allocation.
//! For example, a single 4 KiB frame holds the state of 16,384 frames of
//! physical memory.
//!
//! Entry `i` lives in byte `i / 4`, at bits `2 * (i % 4)` and
//! `2 * (i % 4) + 1`. The array never reads or writes the unused lanes after
//! the last entry, so the storage may be larger than [`bytes_needed`] and
//! its trailing bytes are left untouched.
//!
//! # Examples
//!
//! ```
//! let mut storage = [0u8; 4];
//! let mut data = twobit::TwoBitArray::new(&mut storage, 16).unwrap();
//! assert_eq!(data.count(0), 16);
//!
//! data.set(8, 1);
//! data.fill_range(9..11, 2);
//! assert_eq!(data.count(0), 13);
//! assert_eq!(data.next_ne(0, 0), Some(8));
//! assert_eq!(data.next_eq(9, 0), Some(11));
//! ```

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![allow(clippy::panic)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]
#![forbid(unsafe_code)]

use core::fmt;
use core::ops::Range;

/// The number of entries packed into each byte of storage.
///
pub const ENTRIES_PER_BYTE: usize = 4;

/// The largest value that can be stored in an entry.
///
pub const MAX_VALUE: u8 = 0b11;

/// Selects bit 0 of every lane in a byte.
///
const LOW_BITS: u8 = 0b0101_0101;

/// Returns the number of bytes of storage needed to hold
/// `len` entries.
///
pub const fn bytes_needed(len: usize) -> usize {
    len.div_ceil(ENTRIES_PER_BYTE)
}

/// Returns a byte with every lane set to `value`.
///
const fn splat(value: u8) -> u8 {
    value * LOW_BITS
}

/// Returns the number of lanes in `byte` that hold `value`.
///
const fn lanes_equal(byte: u8, value: u8) -> u32 {
    // A lane matches when both of its bits are
    // clear after the XOR.
    let diff = byte ^ splat(value);
    (!(diff | (diff >> 1)) & LOW_BITS).count_ones()
}

/// Returns the byte index and bit shift of entry `index`.
///
const fn position(index: usize) -> (usize, usize) {
    (index / ENTRIES_PER_BYTE, 2 * (index % ENTRIES_PER_BYTE))
}

/// The storage passed to [`TwoBitArray::new`] cannot hold
/// the requested number of entries.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StorageTooSmall {
    /// The number of bytes required.
    pub needed: usize,
    /// The number of bytes supplied.
    pub provided: usize,
}

impl fmt::Display for StorageTooSmall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "storage of {} bytes is too small; {} bytes are needed",
            self.provided, self.needed
        )
    }
}

/// A packed array of two-bit values.
///
#[derive(Debug, PartialEq, Eq)]
pub struct TwoBitArray<'storage> {
    len: usize,
    bytes: &'storage mut [u8],
}

impl<'storage> TwoBitArray<'storage> {
    /// Wraps `storage` as an array of `len` entries.
    ///
    /// The storage is not modified, so the array starts
    /// out with whatever values the storage already holds.
    /// Use [`fill`](Self::fill) to initialise it.
    ///
    pub fn new(storage: &'storage mut [u8], len: usize) -> Result<Self, StorageTooSmall> {
        let needed = bytes_needed(len);
        if storage.len() < needed {
            return Err(StorageTooSmall {
                needed,
                provided: storage.len(),
            });
        }

        let (bytes, _) = storage.split_at_mut(needed);
        Ok(TwoBitArray { len, bytes })
    }

    /// Returns the number of entries in the array.
    ///
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the array has no entries.
    ///
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value of entry `index`.
    ///
    /// # Panics
    ///
    /// `get` will panic if `index` is not less than the
    /// array's length.
    ///
    pub fn get(&self, index: usize) -> u8 {
        if index >= self.len {
            panic!(
                "cannot call get({}) on TwoBitArray of length {}",
                index, self.len
            );
        }

        let (byte, shift) = position(index);
        (self.bytes[byte] >> shift) & MAX_VALUE
    }

    /// Sets entry `index` to `value`.
    ///
    /// # Panics
    ///
    /// `set` will panic if `index` is not less than the
    /// array's length, or if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn set(&mut self, index: usize, value: u8) {
        if index >= self.len {
            panic!(
                "cannot call set({}) on TwoBitArray of length {}",
                index, self.len
            );
        }

        check_value(value);
        let (byte, shift) = position(index);
        self.bytes[byte] = (self.bytes[byte] & !(MAX_VALUE << shift)) | (value << shift);
    }

    /// Sets every entry to `value`.
    ///
    /// # Panics
    ///
    /// `fill` will panic if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn fill(&mut self, value: u8) {
        self.fill_range(0..self.len, value);
    }

    /// Sets every entry in `range` to `value`.
    ///
    /// # Panics
    ///
    /// `fill_range` will panic if `range` extends past the
    /// end of the array, or if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn fill_range(&mut self, range: Range<usize>, value: u8) {
        if range.start > range.end || range.end > self.len {
            panic!(
                "cannot call fill_range({:?}) on TwoBitArray of length {}",
                range, self.len
            );
        }

        check_value(value);
        let mut i = range.start;

        // Leading entries, up to a byte boundary.
        while i < range.end && i % ENTRIES_PER_BYTE != 0 {
            self.set(i, value);
            i += 1;
        }

        // Whole bytes.
        let pattern = splat(value);
        while i + ENTRIES_PER_BYTE <= range.end {
            self.bytes[i / ENTRIES_PER_BYTE] = pattern;
            i += ENTRIES_PER_BYTE;
        }

        // Trailing entries.
        while i < range.end {
            self.set(i, value);
            i += 1;
        }
    }

    /// Returns the number of entries that hold `value`.
    ///
    /// # Panics
    ///
    /// `count` will panic if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn count(&self, value: u8) -> usize {
        check_value(value);
        let whole = self.len / ENTRIES_PER_BYTE;
        let mut total = self.bytes[..whole]
            .iter()
            .map(|&byte| lanes_equal(byte, value) as usize)
            .sum();

        for i in (whole * ENTRIES_PER_BYTE)..self.len {
            if self.get(i) == value {
                total += 1;
            }
        }

        total
    }

    /// Returns the smallest index `i >= from` such that
    /// entry `i` holds `value`, or `None`.
    ///
    /// # Panics
    ///
    /// `next_eq` will panic if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn next_eq(&self, from: usize, value: u8) -> Option<usize> {
        check_value(value);
        let mut i = from;
        while i < self.len {
            if self.whole_byte_at(i) && lanes_equal(self.bytes[i / ENTRIES_PER_BYTE], value) == 0 {
                i += ENTRIES_PER_BYTE;
                continue;
            }

            if self.get(i) == value {
                return Some(i);
            }

            i += 1;
        }

        None
    }

    /// Returns the smallest index `i >= from` such that
    /// entry `i` does not hold `value`, or `None`.
    ///
    /// # Panics
    ///
    /// `next_ne` will panic if `value` exceeds [`MAX_VALUE`].
    ///
    pub fn next_ne(&self, from: usize, value: u8) -> Option<usize> {
        check_value(value);
        let pattern = splat(value);
        let mut i = from;
        while i < self.len {
            if self.whole_byte_at(i) && self.bytes[i / ENTRIES_PER_BYTE] == pattern {
                i += ENTRIES_PER_BYTE;
                continue;
            }

            if self.get(i) != value {
                return Some(i);
            }

            i += 1;
        }

        None
    }

    /// Returns whether `index` starts a byte whose four
    /// entries are all within the array.
    ///
    fn whole_byte_at(&self, index: usize) -> bool {
        index % ENTRIES_PER_BYTE == 0 && index + ENTRIES_PER_BYTE <= self.len
    }
}

#[track_caller]
fn check_value(value: u8) {
    if value > MAX_VALUE {
        panic!("value {} does not fit in two bits", value);
    }
}
