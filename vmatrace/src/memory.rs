//! Virtual address space bookkeeping.
//!
//! Each traced process owns an [`AddressSpaceTracker`] that records its live
//! regions together with the free ranges around them. The
//! [`TrackerRegistry`] hands out one tracker per process and
//! [`snapshot::export`] turns a tracker into an ordered list of segments.
//!
//! Only virtual address ranges are modelled. Frames, page tables and
//! permissions are not.

pub mod registry;
pub mod snapshot;
pub mod tracker;

pub use registry::{TrackerConfig, TrackerRegistry};
pub use tracker::AddressSpaceTracker;

use thiserror::Error;

/// Identifier of a traced process.
pub type ProcessId = u32;

/// Identifier of a region, unique within one process at any instant.
pub type RegionId = u32;

/// Page size used for headroom rounding unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 256;

/// Errors raised by the address space bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The region has zero size or its end does not fit in the address space.
    #[error("Invalid region {region}: address 0x{address:x}, size {size}")]
    InvalidRegion {
        region: RegionId,
        address: u64,
        size: u64,
    },

    /// Headroom rounding needs a non-zero page size.
    #[error("Invalid page size {0}")]
    InvalidPageSize(u64),
}

/// An allocated segment of virtual memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub address: u64,
    pub size: u64,
}

impl Region {
    /// Address one past the last byte of the region.
    pub fn end(&self) -> u64 {
        self.address + self.size
    }
}

/// A span of unallocated address space.
///
/// Ranges are ordered by `(start, size)`, so a `BTreeSet<FreeRange>` both
/// iterates in address order and drops exact duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FreeRange {
    pub start: u64,
    pub size: u64,
}

impl FreeRange {
    pub fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// Address one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Checks whether this range shares at least one byte with `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        // Two ranges [a1,a2) and [b1,b2) overlap if: a1 < b2 && b1 < a2
        self.start < end && start < self.end()
    }
}

/// Returns the smallest multiple of `page_size` strictly greater than `value`.
///
/// An already aligned value still moves up by a full page, so the distance
/// to the boundary is always positive. Returns `None` if the boundary does
/// not fit in a `u64`.
pub fn next_page_boundary(value: u64, page_size: u64) -> Option<u64> {
    (value / page_size).checked_add(1)?.checked_mul(page_size)
}

/// Rounds `value` up to a multiple of `page_size`, leaving aligned values
/// unchanged. Returns `None` on overflow.
pub fn align_up(value: u64, page_size: u64) -> Option<u64> {
    value.checked_next_multiple_of(page_size)
}
