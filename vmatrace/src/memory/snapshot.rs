//! Read-only view of a tracker as an ordered list of segments.

use crate::memory::tracker::AddressSpaceTracker;
use crate::memory::{ProcessId, RegionId};
use std::fmt;

/// What a segment stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLabel {
    /// A live region of the given process.
    Region { pid: ProcessId, region: RegionId },
    /// A free range. Free ranges carry no identity.
    Free,
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentLabel::Region { pid, region } => write!(f, "P{pid}:R{region}"),
            SegmentLabel::Free => write!(f, "free"),
        }
    }
}

/// A half open address range `[start, end)` of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
    pub label: SegmentLabel,
    pub allocated: bool,
}

impl Segment {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Lists every region and free range of `tracker` sorted by start address.
///
/// Segments sharing a start address keep regions before free ranges.
pub fn export(tracker: &AddressSpaceTracker) -> Vec<Segment> {
    let pid = tracker.pid();
    let regions = tracker.regions().map(|(region, extent)| Segment {
        start: extent.address,
        end: extent.end(),
        label: SegmentLabel::Region { pid, region },
        allocated: true,
    });
    let free = tracker.free_ranges().map(|range| Segment {
        start: range.start,
        end: range.end(),
        label: SegmentLabel::Free,
        allocated: false,
    });

    let mut segments: Vec<Segment> = regions.chain(free).collect();
    segments.sort_by_key(|segment| segment.start);
    segments
}
