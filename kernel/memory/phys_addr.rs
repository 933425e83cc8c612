// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use core::fmt;

/// The bits that must be clear in a valid physical address.
///
const INVALID_BITS: usize = 0xfff0_0000_0000_0000;

/// A physical memory address for the target architecture.
///
/// A `PhysAddr` can only store an address that is valid:
/// the top 12 bits are always zero.
///
#[repr(transparent)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhysAddr(usize);

/// An invalid physical memory address.
///
/// If an attempt is made to create a `PhysAddr` from a
/// value that is not valid on the target platform, then
/// `InvalidPhysAddr` is returned, containing the attempted
/// value.
///
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InvalidPhysAddr(pub usize);

impl fmt::Display for InvalidPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid physical address {:#x}", self.0)
    }
}

impl PhysAddr {
    /// Creates a new physical memory address.
    ///
    /// # Panics
    ///
    /// `new` will panic if `addr` is not valid for the
    /// target platform.
    ///
    #[inline]
    #[track_caller]
    pub const fn new(addr: usize) -> Self {
        match Self::try_new(addr) {
            Ok(addr) => addr,
            Err(_) => panic!("invalid address passed to PhysAddr::new"),
        }
    }

    /// Tries to create a new physical memory address.
    ///
    #[inline]
    pub const fn try_new(addr: usize) -> Result<Self, InvalidPhysAddr> {
        if addr & INVALID_BITS == 0 {
            Ok(PhysAddr(addr))
        } else {
            Err(InvalidPhysAddr(addr))
        }
    }

    /// Returns the address's numerical value.
    ///
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
