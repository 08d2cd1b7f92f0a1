//! VMA Trace Library
//!
//! Replays the memory trace printed by an OS simulator and rebuilds, after
//! every allocation and deallocation, the regions and free ranges of the
//! process involved.
//!
//! The address space bookkeeping lives in [`memory`]. [`trace`] turns log
//! lines into events, [`replay`] drives the trackers and [`report`] renders
//! the resulting snapshots as text.

pub mod memory;
pub mod replay;
pub mod report;
pub mod trace;

use crate::memory::TrackerConfig;
use crate::replay::Replay;
use crate::trace::Trace;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Replay a trace file.
///
/// # Arguments
/// * `path` - Log file to replay
/// * `page_size` - Granularity of the headroom added after allocations
/// * `extent` - Initial address space size. Derived from the largest
///   allocation of the trace when `None`.
///
/// # Returns
/// * `Ok(Replay)` - The snapshots and final trackers
/// * `Err(anyhow::Error)` - The file could not be read or the configuration is invalid
pub fn replay_file(path: &Path, page_size: u64, extent: Option<u64>) -> Result<Replay> {
    let trace = Trace::from_file(path)?;
    let extent = match extent {
        Some(extent) => extent,
        None => trace.suggested_extent(page_size)?,
    };
    info!("Initial address space extent: 0x{:x}", extent);

    let config = TrackerConfig::new(page_size, extent).context("Invalid tracker configuration")?;
    Ok(replay::replay(&trace, config))
}
