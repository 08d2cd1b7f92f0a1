//! Plain text rendering of replay snapshots.

use crate::memory::ProcessId;
use crate::memory::snapshot::Segment;
use crate::replay::Snapshot;
use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label.to_string();
        write!(
            f,
            "[0x{:08x}, 0x{:08x}) {:<10} {} bytes",
            self.start,
            self.end,
            label,
            self.size()
        )
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PID {} after event {} ({})",
            self.pid, self.event_index, self.kind
        )?;
        for segment in &self.segments {
            writeln!(f, "  {}", segment)?;
        }
        Ok(())
    }
}

/// Which snapshots end up in a report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    /// Only report this process
    pub pid: Option<ProcessId>,
    /// Only report the last snapshot of each process
    pub final_only: bool,
}

impl ReportFilter {
    /// Picks the snapshots to report, keeping their trace order.
    pub fn select<'a>(&self, snapshots: &'a [Snapshot]) -> Vec<&'a Snapshot> {
        let matching = |snapshot: &&Snapshot| self.pid.is_none_or(|pid| snapshot.pid == pid);
        if !self.final_only {
            return snapshots.iter().filter(matching).collect();
        }
        let mut seen = BTreeSet::new();
        let mut last: Vec<&Snapshot> = snapshots
            .iter()
            .rev()
            .filter(matching)
            .filter(|snapshot| seen.insert(snapshot.pid))
            .collect();
        last.reverse();
        last
    }
}

/// Writes the selected snapshots separated by blank lines.
pub fn write_report<W: Write>(
    out: &mut W,
    snapshots: &[Snapshot],
    filter: ReportFilter,
) -> Result<usize> {
    let selected = filter.select(snapshots);
    for (i, snapshot) in selected.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        write!(out, "{}", snapshot)?;
    }
    out.flush()?;
    Ok(selected.len())
}
