//! Per-process address space tracker.
//!
//! Keeps the live regions of one process and the free ranges around them.
//! Allocating carves the region out of the free ranges and appends one page
//! of headroom after it. Deallocating returns the region to the free ranges
//! and coalesces them.
//!
//! Allocation only drops exact duplicate free ranges, it never merges
//! adjacent or overlapping ones. Full coalescing happens on deallocation.

use crate::memory::{
    FreeRange, ProcessId, Region, RegionId, TrackerConfig, TrackerError, next_page_boundary,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tracks the regions and free ranges of a single process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceTracker {
    pid: ProcessId,
    /// Granularity of the headroom added after each allocation.
    page_size: u64,
    /// Map from region id to the live region
    regions: BTreeMap<RegionId, Region>,
    /// Free ranges ordered by start address
    free: BTreeSet<FreeRange>,
}

impl AddressSpaceTracker {
    /// Creates a tracker seeded with the free range `[0, extent)`.
    ///
    /// An `extent` of zero yields an empty tracker.
    pub fn new(pid: ProcessId, extent: u64) -> Self {
        Self::with_config(pid, extent, &TrackerConfig::default())
    }

    /// Same as [`AddressSpaceTracker::new`] with the headroom page size of
    /// `config`. The default extent of `config` is not used.
    pub fn with_config(pid: ProcessId, extent: u64, config: &TrackerConfig) -> Self {
        let mut free = BTreeSet::new();
        if extent > 0 {
            free.insert(FreeRange::new(0, extent));
        }
        Self {
            pid,
            page_size: config.page_size(),
            regions: BTreeMap::new(),
            free,
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Records a new region and removes its addresses from the free ranges.
    ///
    /// A live region with the same id is overwritten. Overlap with other live
    /// regions is not checked.
    ///
    /// # Arguments
    /// * `region` - Id of the region, unique within this process
    /// * `address` - Starting address of the region
    /// * `size` - Size of the region in bytes
    ///
    /// # Returns
    /// * `Ok(())` - Region recorded
    /// * `Err(TrackerError::InvalidRegion)` - If `size` is zero or the region
    ///   and its headroom do not fit in the address space. The tracker is
    ///   left unchanged.
    pub fn allocate(
        &mut self,
        region: RegionId,
        address: u64,
        size: u64,
    ) -> Result<(), TrackerError> {
        let invalid = TrackerError::InvalidRegion {
            region,
            address,
            size,
        };
        if size == 0 {
            return Err(invalid);
        }
        let end = address.checked_add(size).ok_or(invalid.clone())?;
        let headroom_end = next_page_boundary(end, self.page_size).ok_or(invalid)?;

        self.carve(address, end);

        if let Some(previous) = self.regions.insert(region, Region { address, size }) {
            debug!(
                "PID {}: region {} overwritten (was 0x{:x}, size {})",
                self.pid, region, previous.address, previous.size
            );
        }

        // The set drops the headroom if an identical range is already free.
        self.free.insert(FreeRange::new(end, headroom_end - end));

        debug!(
            "PID {}: allocated region {} at 0x{:x} (size {}), {} free ranges",
            self.pid,
            region,
            address,
            size,
            self.free.len()
        );
        Ok(())
    }

    /// Releases a region and coalesces the free ranges.
    ///
    /// Unknown region ids are ignored.
    pub fn deallocate(&mut self, region: RegionId) {
        let Some(released) = self.regions.remove(&region) else {
            debug!("PID {}: no live region {}, ignoring", self.pid, region);
            return;
        };

        self.free.insert(FreeRange::new(released.address, released.size));
        self.coalesce();

        debug!(
            "PID {}: deallocated region {} at 0x{:x} (size {}), {} free ranges",
            self.pid,
            region,
            released.address,
            released.size,
            self.free.len()
        );
    }

    /// Removes `[start, end)` from every free range, keeping the remainders
    /// on either side.
    ///
    /// Allocation leaves overlapping free ranges behind (a split remainder
    /// and the headroom share a start but not a size), so a range starting
    /// far below `start` may still reach into it. Without a bound on range
    /// length every range starting before `end` has to be checked.
    fn carve(&mut self, start: u64, end: u64) {
        let overlapping: Vec<FreeRange> = self
            .free
            .range(..FreeRange::new(end, 0))
            .filter(|range| range.overlaps(start, end))
            .copied()
            .collect();

        for range in overlapping {
            self.free.remove(&range);
            if range.start < start {
                self.free.insert(FreeRange::new(range.start, start - range.start));
            }
            if end < range.end() {
                self.free.insert(FreeRange::new(end, range.end() - end));
            }
        }
    }

    /// Merges every pair of touching or overlapping free ranges.
    fn coalesce(&mut self) {
        let mut merged: Vec<FreeRange> = Vec::with_capacity(self.free.len());
        for range in &self.free {
            match merged.last_mut() {
                Some(last) if range.start <= last.end() => {
                    last.size = last.end().max(range.end()) - last.start;
                }
                _ => merged.push(*range),
            }
        }
        self.free = merged.into_iter().collect();
        debug_assert!(self.is_coalesced());
    }

    /// Looks up a live region.
    pub fn region(&self, region: RegionId) -> Option<&Region> {
        self.regions.get(&region)
    }

    /// Iterates over live regions in region id order.
    pub fn regions(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().map(|(id, region)| (*id, region))
    }

    /// Iterates over free ranges in ascending `(start, size)` order.
    pub fn free_ranges(&self) -> impl Iterator<Item = &FreeRange> {
        self.free.iter()
    }

    /// Checks that no two free ranges touch or overlap.
    fn is_coalesced(&self) -> bool {
        self.free
            .iter()
            .zip(self.free.iter().skip(1))
            .all(|(left, right)| left.end() < right.start)
    }

    /// Lowest start and highest end over every region and free range.
    #[cfg(test)]
    fn tracked_span(&self) -> Option<(u64, u64)> {
        let starts = self
            .regions
            .values()
            .map(|region| region.address)
            .chain(self.free.iter().map(|range| range.start));
        let ends = self
            .regions
            .values()
            .map(Region::end)
            .chain(self.free.iter().map(FreeRange::end));
        Some((starts.min()?, ends.max()?))
    }
}
