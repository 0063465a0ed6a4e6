//! Exit status codes for the CLI
//!
//! apipulse follows standard Unix exit code conventions, with one addition:
//! - 0: Success (every executed request passed)
//! - 1: Any error (unreadable input, broker unavailable, invalid arguments)
//! - 10: Run completed but at least one request failed an assertion
//!
//! The distinct assertion-failure code lets CI pipelines tell "the tests ran
//! and found problems" apart from "the runner itself broke".

use std::process::{ExitCode, Termination};

/// Exit status codes for run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Successful execution, all requests passed
    Success = 0,
    /// Tool-level error (bad input, unreachable broker, I/O failure)
    Error = 1,
    /// Run finished but one or more requests failed or errored
    AssertionFailed = 10,
}

/// Exit code for assertion failures (kept as a named constant for scripts)
pub const EXIT_ASSERTION_FAILED: i32 = 10;

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    /// Exit status for a finished collection run.
    ///
    /// `all_passed` covers skipped and errored requests too: anything other
    /// than a clean pass maps to the assertion-failure code.
    pub fn from_run(all_passed: bool) -> Self {
        if all_passed {
            ExitStatus::Success
        } else {
            ExitStatus::AssertionFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_run() {
        assert_eq!(ExitStatus::from_run(true), ExitStatus::Success);
        assert_eq!(ExitStatus::from_run(false), ExitStatus::AssertionFailed);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success as u8, 0);
        assert_eq!(ExitStatus::Error as u8, 1);
        assert_eq!(ExitStatus::AssertionFailed as u8, EXIT_ASSERTION_FAILED as u8);
    }
}
