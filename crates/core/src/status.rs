//! Batch status lifecycle enum
//!
//! The ordering of the variants matters: `upgrade_to` relies on it to make
//! sure status reconciliation never downgrades a completed or failed
//! execution back to a running state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BatchError;

/// Lifecycle status of a job or step execution.
///
/// Variants are declared in severity order: everything after `Started` is
/// considered "at least as severe", so combining two statuses keeps the
/// greater one. For the states up to `Started` the smaller ordinal wins,
/// which is what keeps a `Completed` execution completed when a stale
/// writer reports `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Completed,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    Abandoned,
    Unknown,
}

impl BatchStatus {
    /// Combine this status with another, never losing completion or
    /// failure information.
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        if self > BatchStatus::Started || other > BatchStatus::Started {
            self.max(other)
        } else if self == BatchStatus::Completed || other == BatchStatus::Completed {
            BatchStatus::Completed
        } else {
            self.max(other)
        }
    }

    /// True for states in which the execution is still making progress.
    pub fn is_running(self) -> bool {
        matches!(self, BatchStatus::Starting | BatchStatus::Started)
    }

    /// True once the execution can no longer change state on its own.
    pub fn is_unsuccessful(self) -> bool {
        matches!(
            self,
            BatchStatus::Failed
                | BatchStatus::Stopped
                | BatchStatus::Stopping
                | BatchStatus::Abandoned
                | BatchStatus::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Stopping => "STOPPING",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Abandoned => "ABANDONED",
            BatchStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(BatchStatus::Completed),
            "STARTING" => Ok(BatchStatus::Starting),
            "STARTED" => Ok(BatchStatus::Started),
            "STOPPING" => Ok(BatchStatus::Stopping),
            "STOPPED" => Ok(BatchStatus::Stopped),
            "FAILED" => Ok(BatchStatus::Failed),
            "ABANDONED" => Ok(BatchStatus::Abandoned),
            "UNKNOWN" => Ok(BatchStatus::Unknown),
            other => Err(BatchError::validation(format!(
                "unrecognized batch status '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_keeps_completion() {
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Started),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Started.upgrade_to(BatchStatus::Completed),
            BatchStatus::Completed
        );
    }

    #[test]
    fn upgrade_prefers_more_severe_state() {
        assert_eq!(
            BatchStatus::Started.upgrade_to(BatchStatus::Failed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Abandoned),
            BatchStatus::Abandoned
        );
        assert_eq!(
            BatchStatus::Stopping.upgrade_to(BatchStatus::Stopped),
            BatchStatus::Stopped
        );
    }

    #[test]
    fn upgrade_advances_running_states() {
        assert_eq!(
            BatchStatus::Starting.upgrade_to(BatchStatus::Started),
            BatchStatus::Started
        );
    }

    #[test]
    fn round_trips_through_strings() {
        for status in [
            BatchStatus::Completed,
            BatchStatus::Starting,
            BatchStatus::Started,
            BatchStatus::Stopping,
            BatchStatus::Stopped,
            BatchStatus::Failed,
            BatchStatus::Abandoned,
            BatchStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
    }

    #[test]
    fn rejects_unknown_strings() {
        assert!("JOGGING".parse::<BatchStatus>().is_err());
    }
}
