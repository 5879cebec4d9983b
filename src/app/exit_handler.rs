//! Exit code logic for the fetchpool process.
//!
//! Single responsibility: map run counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from the run's counts.
///
/// A canceled run wins over everything else.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize, canceled: bool) -> ProcessExit {
    if canceled {
        ProcessExit::Canceled
    } else if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::determine_exit_outcome;
    use crate::ProcessExit;

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(determine_exit_outcome(3, 0, false), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_success_when_zero_completed_zero_failed() {
        assert_eq!(determine_exit_outcome(0, 0, false), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1, false), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(determine_exit_outcome(0, 2, false), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_outcome_canceled_overrides_counts() {
        assert_eq!(determine_exit_outcome(5, 0, true), ProcessExit::Canceled);
        assert_eq!(determine_exit_outcome(0, 5, true), ProcessExit::Canceled);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Partial.code(), 2);
        assert_eq!(ProcessExit::Canceled.code(), 130);
    }
}
