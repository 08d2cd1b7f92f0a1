//! Memory trace parsing.
//!
//! Turns the log printed by the simulated OS into an ordered list of
//! [`TraceEvent`]s. Allocation records look like
//! `PID=1 - Region=0 - Address=00000000 - Size=300 byte` and deallocation
//! records like `PID=1 - Region=0`. Read and write records are recognised
//! but never change an address space. Any other line is skipped.

use crate::memory::{DEFAULT_PAGE_SIZE, ProcessId, RegionId, align_up};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// A single record of a memory trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Allocate {
        pid: ProcessId,
        region: RegionId,
        address: u64,
        size: u64,
    },
    Deallocate {
        pid: ProcessId,
        region: RegionId,
    },
    Read {
        region: RegionId,
        offset: u64,
        value: i64,
    },
    Write {
        region: RegionId,
        offset: u64,
        value: i64,
    },
}

impl TraceEvent {
    /// Process whose address space this event changes, if any.
    pub fn pid(&self) -> Option<ProcessId> {
        match self {
            TraceEvent::Allocate { pid, .. } | TraceEvent::Deallocate { pid, .. } => Some(*pid),
            TraceEvent::Read { .. } | TraceEvent::Write { .. } => None,
        }
    }

    /// Whether this event changes an address space.
    pub fn is_tracked(&self) -> bool {
        self.pid().is_some()
    }

    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::Allocate { .. } => EventKind::Alloc,
            TraceEvent::Deallocate { .. } => EventKind::Dealloc,
            TraceEvent::Read { .. } => EventKind::Read,
            TraceEvent::Write { .. } => EventKind::Write,
        }
    }
}

/// Kind of a [`TraceEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Alloc,
    Dealloc,
    Read,
    Write,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Alloc => "alloc",
            EventKind::Dealloc => "dealloc",
            EventKind::Read => "read",
            EventKind::Write => "write",
        };
        f.write_str(name)
    }
}

/// An event together with its position in the trace.
///
/// Only allocate and deallocate events are numbered. Read and write events
/// carry the index of the next tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedEvent {
    pub index: usize,
    pub event: TraceEvent,
}

/// A parsed trace in log order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    events: Vec<IndexedEvent>,
    /// Highest `address + size` over all allocations
    max_end: u64,
}

struct Patterns {
    alloc: Regex,
    dealloc: Regex,
    read: Regex,
    write: Regex,
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(|| {
    Ok(Patterns {
        alloc: Regex::new(
            r"PID=(\d+) - Region=(\d+) - Address=([0-9A-Fa-fx]+) - Size=(\d+) byte",
        )?,
        dealloc: Regex::new(r"PID=(\d+) - Region=(\d+)")?,
        read: Regex::new(r"read region=(\d+) offset=(\d+) value=(-?\d+)")?,
        write: Regex::new(r"write region=(\d+) offset=(\d+) value=(-?\d+)")?,
    })
});

/// Parses an address printed either in hex (with or without `0x`) or decimal.
///
/// Hex is tried first since the simulator prints addresses with `%08x`.
pub fn parse_address(text: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .or_else(|_| text.parse::<u64>())
        .with_context(|| format!("Invalid address '{}'", text))
}

fn field<T: std::str::FromStr>(text: &str, name: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse::<T>()
        .with_context(|| format!("Invalid {} '{}'", name, text))
}

/// Parses a single log line.
///
/// # Returns
/// * `Ok(Some(event))` - The line is a trace record
/// * `Ok(None)` - The line is not a trace record
/// * `Err(anyhow::Error)` - The line is a record with malformed numbers
pub fn parse_line(line: &str) -> Result<Option<TraceEvent>> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| anyhow!("Invalid trace pattern: {}", e))?;

    if let Some(caps) = patterns.alloc.captures(line) {
        return Ok(Some(TraceEvent::Allocate {
            pid: field(&caps[1], "pid")?,
            region: field(&caps[2], "region")?,
            address: parse_address(&caps[3])?,
            size: field(&caps[4], "size")?,
        }));
    }

    // Allocation records also match the shorter pattern.
    if !line.contains("Size")
        && let Some(caps) = patterns.dealloc.captures(line)
    {
        return Ok(Some(TraceEvent::Deallocate {
            pid: field(&caps[1], "pid")?,
            region: field(&caps[2], "region")?,
        }));
    }

    if let Some(caps) = patterns.write.captures(line) {
        return Ok(Some(TraceEvent::Write {
            region: field(&caps[1], "region")?,
            offset: field(&caps[2], "offset")?,
            value: field(&caps[3], "value")?,
        }));
    }

    if let Some(caps) = patterns.read.captures(line) {
        return Ok(Some(TraceEvent::Read {
            region: field(&caps[1], "region")?,
            offset: field(&caps[2], "offset")?,
            value: field(&caps[3], "value")?,
        }));
    }

    Ok(None)
}

impl Trace {
    /// Parses a whole log.
    ///
    /// Records whose numbers do not parse are reported and skipped, so one
    /// corrupted line does not hide the rest of the trace.
    pub fn parse(log: &str) -> Self {
        let events = log
            .lines()
            .enumerate()
            .filter_map(|(line_no, line)| match parse_line(line.trim()) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping line {}: {:#}", line_no + 1, e);
                    None
                }
            });
        let trace = Self::from_events(events);
        debug!("Parsed {} trace events", trace.events.len());
        trace
    }

    /// Reads and parses a log file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let log = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace {}", path.display()))?;
        Ok(Self::parse(&log))
    }

    /// Creates a trace from events already in order.
    pub fn from_events(events: impl IntoIterator<Item = TraceEvent>) -> Self {
        let mut trace = Trace::default();
        let mut index = 0;
        for event in events {
            if let TraceEvent::Allocate { address, size, .. } = event {
                trace.max_end = trace.max_end.max(address.saturating_add(size));
            }
            trace.events.push(IndexedEvent { index, event });
            if event.is_tracked() {
                index += 1;
            }
        }
        trace
    }

    pub fn events(&self) -> &[IndexedEvent] {
        &self.events
    }

    /// Highest `address + size` seen in any allocation of the trace.
    pub fn max_end(&self) -> u64 {
        self.max_end
    }

    /// Address space size that covers every allocation of the trace,
    /// rounded up to a whole page, or zero if the trace allocates nothing.
    pub fn suggested_extent(&self, page_size: u64) -> Result<u64> {
        if page_size == 0 {
            bail!("Page size must be non-zero");
        }
        align_up(self.max_end, page_size)
            .with_context(|| format!("Trace extent 0x{:x} overflows", self.max_end))
    }

    /// [`Trace::suggested_extent`] with the default page size.
    pub fn default_extent(&self) -> Result<u64> {
        self.suggested_extent(DEFAULT_PAGE_SIZE)
    }
}
