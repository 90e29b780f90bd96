//! Core types shared by the runner and the report

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Code reported for errors a flavor does not recognize
pub const UNKNOWN_ERROR_CODE: &str = "unknown";

/// Result of one timed statement execution as the core sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub latency: Duration,
    /// Canonical error code, `None` on success
    pub error_code: Option<String>,
}

impl QueryOutcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            latency,
            error_code: None,
        }
    }

    pub fn error(latency: Duration, code: impl Into<String>) -> Self {
        Self {
            latency,
            error_code: Some(code.into()),
        }
    }

    /// Decide success / accepted / failure against the accepted code set
    pub fn classify(self, accepted: &BTreeSet<String>) -> Outcome {
        match self.error_code {
            None => Outcome::Success,
            Some(code) if accepted.contains(&code) => Outcome::AcceptedError(code),
            Some(code) => Outcome::Failure(code),
        }
    }
}

/// Classified query outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AcceptedError(String),
    Failure(String),
}

impl Outcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::AcceptedError(_) => "accepted_error",
            Outcome::Failure(_) => "failure",
        }
    }
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Created, start time not yet being waited on
    Scheduled,
    /// Waiting for the start offset
    Armed,
    /// Dispatching queries
    Running,
    /// No new dispatch, waiting for in-flight queries
    Draining,
    Done,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobPhase::Scheduled => "scheduled",
            JobPhase::Armed => "armed",
            JobPhase::Running => "running",
            JobPhase::Draining => "draining",
            JobPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let accepted: BTreeSet<String> = ["1205".to_string()].into_iter().collect();
        let latency = Duration::from_millis(1);

        assert_eq!(QueryOutcome::success(latency).classify(&accepted), Outcome::Success);
        assert_eq!(
            QueryOutcome::error(latency, "1205").classify(&accepted),
            Outcome::AcceptedError("1205".into())
        );
        assert_eq!(
            QueryOutcome::error(latency, "1213").classify(&accepted),
            Outcome::Failure("1213".into())
        );
    }
}
