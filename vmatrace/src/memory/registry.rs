//! Registry of per-process trackers.

use crate::memory::tracker::AddressSpaceTracker;
use crate::memory::{DEFAULT_PAGE_SIZE, ProcessId, TrackerError};
use std::collections::BTreeMap;
use tracing::debug;

/// Settings shared by every tracker of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    page_size: u64,
    default_extent: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            default_extent: 0,
        }
    }
}

impl TrackerConfig {
    /// Creates a configuration.
    ///
    /// # Arguments
    /// * `page_size` - Granularity of the headroom added after allocations
    /// * `default_extent` - Size of the free range a new tracker starts with
    pub fn new(page_size: u64, default_extent: u64) -> Result<Self, TrackerError> {
        if page_size == 0 {
            return Err(TrackerError::InvalidPageSize(page_size));
        }
        Ok(Self {
            page_size,
            default_extent,
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn default_extent(&self) -> u64 {
        self.default_extent
    }
}

/// Owns one [`AddressSpaceTracker`] per process id.
///
/// Trackers are created on first use and live as long as the registry.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    config: TrackerConfig,
    trackers: BTreeMap<ProcessId, AddressSpaceTracker>,
}

impl TrackerRegistry {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            trackers: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns the tracker of `pid`, creating it if needed.
    ///
    /// A new tracker is seeded with the free range `[0, extent)` where
    /// `extent` is the larger of the default extent and `size_hint`. The hint
    /// is ignored when the tracker already exists.
    pub fn get_or_create(
        &mut self,
        pid: ProcessId,
        size_hint: Option<u64>,
    ) -> &mut AddressSpaceTracker {
        let config = self.config;
        self.trackers.entry(pid).or_insert_with(|| {
            let extent = config.default_extent.max(size_hint.unwrap_or(0));
            debug!("PID {}: new address space with extent 0x{:x}", pid, extent);
            AddressSpaceTracker::with_config(pid, extent, &config)
        })
    }

    pub fn get(&self, pid: ProcessId) -> Option<&AddressSpaceTracker> {
        self.trackers.get(&pid)
    }

    /// Iterates over all trackers in process id order.
    pub fn trackers(&self) -> impl Iterator<Item = &AddressSpaceTracker> {
        self.trackers.values()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
