//! Common test utilities and macros

use std::path::Path;
use vmatrace::memory::{DEFAULT_PAGE_SIZE, ProcessId, RegionId};
use vmatrace::report::{ReportFilter, write_report};

#[derive(Debug)]
pub enum TestResult {
    /// Final regions as `(id, address, size)` and free ranges as `(start, size)`.
    State {
        regions: Vec<(RegionId, u64, u64)>,
        free: Vec<(u64, u64)>,
    },
    Report(String),
    ReportRegex(String),
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                TestResult::State { regions, free },
                TestResult::State {
                    regions: other_regions,
                    free: other_free,
                },
            ) => regions == other_regions && free == other_free,
            (TestResult::Report(a), TestResult::Report(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ReportRegex(pattern), TestResult::Report(text))
            | (TestResult::Report(text), TestResult::ReportRegex(pattern))
            | (TestResult::ErrorRegex(pattern), TestResult::Error(text))
            | (TestResult::Error(text), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(text)
            }
            _ => false,
        }
    }
}

fn input_path(input_file: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("inputs")
        .join(input_file)
}

/// Replays `input_file` and returns the final state of `pid`.
pub fn run_replay_test(input_file: &str, pid: ProcessId) -> TestResult {
    let replay = match vmatrace::replay_file(&input_path(input_file), DEFAULT_PAGE_SIZE, None) {
        Ok(replay) => replay,
        Err(e) => return TestResult::Error(format!("{e:#}")),
    };

    let Some(tracker) = replay.registry.get(pid) else {
        return TestResult::Error(format!("No tracker for PID {pid}"));
    };
    TestResult::State {
        regions: tracker
            .regions()
            .map(|(id, region)| (id, region.address, region.size))
            .collect(),
        free: tracker
            .free_ranges()
            .map(|range| (range.start, range.size))
            .collect(),
    }
}

/// Replays `input_file` and renders the report selected by `filter`.
pub fn run_report_test(input_file: &str, filter: ReportFilter) -> TestResult {
    let replay = match vmatrace::replay_file(&input_path(input_file), DEFAULT_PAGE_SIZE, None) {
        Ok(replay) => replay,
        Err(e) => return TestResult::Error(format!("{e:#}")),
    };

    let mut out = Vec::new();
    match write_report(&mut out, &replay.snapshots, filter) {
        Ok(_) => TestResult::Report(String::from_utf8(out).unwrap()),
        Err(e) => TestResult::Error(format!("{e:#}")),
    }
}

#[macro_export]
macro_rules! check_replay {
    ($test_name:ident, input=$input_file:expr, pid=$pid:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let result = crate::common::run_replay_test($input_file, $pid);
            assert_eq!(result, $expected);
        }
    };
}

#[macro_export]
macro_rules! check_report {
    ($test_name:ident, input=$input_file:expr, filter=$filter:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let result = crate::common::run_report_test($input_file, $filter);
            assert_eq!(result, $expected);
        }
    };
}
