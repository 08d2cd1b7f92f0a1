//! Trace replay.
//!
//! Applies every tracked event of a [`Trace`] to the registry in order and
//! records a [`Snapshot`] of the affected process after each one.

use crate::memory::snapshot::{Segment, export};
use crate::memory::{ProcessId, TrackerConfig, TrackerRegistry, next_page_boundary};
use crate::trace::{EventKind, Trace, TraceEvent};
use tracing::{debug, info, warn};

/// State of one process right after a tracked event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub event_index: usize,
    pub pid: ProcessId,
    pub kind: EventKind,
    pub segments: Vec<Segment>,
}

/// Outcome of replaying a whole trace.
#[derive(Debug)]
pub struct Replay {
    pub snapshots: Vec<Snapshot>,
    pub registry: TrackerRegistry,
}

/// Replays `trace` on a fresh registry.
///
/// Allocations rejected by their tracker are logged and skipped without a
/// snapshot. The rest of the trace is still applied.
pub fn replay(trace: &Trace, config: TrackerConfig) -> Replay {
    info!(
        "Replaying {} events (page size {}, default extent 0x{:x})",
        trace.events().len(),
        config.page_size(),
        config.default_extent()
    );

    let mut registry = TrackerRegistry::new(config);
    let mut snapshots = Vec::new();

    for indexed in trace.events() {
        let tracker = match indexed.event {
            TraceEvent::Allocate {
                pid,
                region,
                address,
                size,
            } => {
                let size_hint = address
                    .checked_add(size)
                    .and_then(|end| next_page_boundary(end, config.page_size()));
                let tracker = registry.get_or_create(pid, size_hint);
                if let Err(e) = tracker.allocate(region, address, size) {
                    warn!("Event {} (PID {}) skipped: {}", indexed.index, pid, e);
                    continue;
                }
                tracker
            }
            TraceEvent::Deallocate { pid, region } => {
                let tracker = registry.get_or_create(pid, None);
                tracker.deallocate(region);
                tracker
            }
            TraceEvent::Read { .. } | TraceEvent::Write { .. } => {
                debug!("Event {}: ignoring {}", indexed.index, indexed.event.kind());
                continue;
            }
        };

        snapshots.push(Snapshot {
            event_index: indexed.index,
            pid: tracker.pid(),
            kind: indexed.event.kind(),
            segments: export(tracker),
        });
    }

    info!(
        "Replay finished: {} snapshots over {} processes",
        snapshots.len(),
        registry.len()
    );
    Replay {
        snapshots,
        registry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::snapshot::SegmentLabel;

    fn alloc(pid: ProcessId, region: u32, address: u64, size: u64) -> TraceEvent {
        TraceEvent::Allocate {
            pid,
            region,
            address,
            size,
        }
    }

    #[test]
    fn test_snapshot_per_tracked_event() {
        let trace = Trace::from_events([
            alloc(1, 0, 0, 100),
            TraceEvent::Write {
                region: 0,
                offset: 4,
                value: 1,
            },
            alloc(2, 0, 0, 50),
            TraceEvent::Deallocate { pid: 1, region: 0 },
        ]);
        let replay = replay(&trace, TrackerConfig::default());

        let seen: Vec<_> = replay
            .snapshots
            .iter()
            .map(|s| (s.event_index, s.pid, s.kind))
            .collect();
        assert_eq!(
            seen,
            vec![
                (0, 1, EventKind::Alloc),
                (1, 2, EventKind::Alloc),
                (2, 1, EventKind::Dealloc)
            ]
        );
        assert_eq!(replay.registry.len(), 2);
    }

    #[test]
    fn test_first_allocation_sizes_address_space() {
        // Default extent is smaller than the first allocation
        let config = TrackerConfig::new(256, 256).unwrap();
        let trace = Trace::from_events([alloc(1, 0, 0, 1000)]);
        let replay = replay(&trace, config);

        let segments = &replay.snapshots[0].segments;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start, 1000);
        assert_eq!(segments[1].end, 1024);
        assert_eq!(segments[1].label, SegmentLabel::Free);
    }

    #[test]
    fn test_deallocate_first_uses_default_extent() {
        let config = TrackerConfig::new(256, 512).unwrap();
        let trace = Trace::from_events([TraceEvent::Deallocate { pid: 5, region: 1 }]);
        let replay = replay(&trace, config);

        assert_eq!(replay.snapshots.len(), 1);
        assert_eq!(replay.snapshots[0].segments.len(), 1);
        assert_eq!(replay.snapshots[0].segments[0].end, 512);
    }

    #[test]
    fn test_invalid_allocation_is_skipped() {
        let trace = Trace::from_events([
            alloc(1, 0, 0, 64),
            alloc(1, 1, 64, 0),
            TraceEvent::Deallocate { pid: 1, region: 0 },
        ]);
        let replay = replay(&trace, TrackerConfig::new(256, 256).unwrap());

        let seen: Vec<_> = replay
            .snapshots
            .iter()
            .map(|s| (s.event_index, s.kind))
            .collect();
        assert_eq!(seen, vec![(0, EventKind::Alloc), (2, EventKind::Dealloc)]);

        let tracker = replay.registry.get(1).unwrap();
        assert!(tracker.region(1).is_none());
        assert_eq!(
            replay.snapshots[1].segments,
            vec![Segment {
                start: 0,
                end: 256,
                label: SegmentLabel::Free,
                allocated: false,
            }]
        );
    }
}
