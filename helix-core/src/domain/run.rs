//! Pipeline run domain types
//!
//! Structure shared between the submit side (creates the record) and the
//! driver (applies lifecycle transitions). The transition rules live here so
//! the record store stays a dumb persistence layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sample_sheet::SampleSheetRow;

/// A single end-to-end execution of the analysis workflow.
///
/// Created by the enrollment step before the driver ever runs; the driver
/// only applies transitions via [`PipelineRun::transition`] and never deletes
/// the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub run_name: String,
    pub status: RunStatus,
    pub create_dt: chrono::DateTime<chrono::Utc>,
    pub start_dt: Option<chrono::DateTime<chrono::Utc>>,
    pub end_dt: Option<chrono::DateTime<chrono::Utc>>,
    pub output_folder_path: String,
    pub sample_sheet: Vec<SampleSheetRow>,
}

/// Run lifecycle status
///
/// Monotonic: Created -> Started -> (Succeeded | Failed), plus the
/// Created -> Failed short-circuit for runs that die before starting
/// (e.g. secret retrieval failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Started,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Returns true for Succeeded and Failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Whether the one-directional lifecycle permits moving to `next`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Started)
                | (RunStatus::Created, RunStatus::Failed)
                | (RunStatus::Started, RunStatus::Succeeded)
                | (RunStatus::Started, RunStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "Created",
            RunStatus::Started => "Started",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(RunStatus::Created),
            "Started" => Ok(RunStatus::Started),
            "Succeeded" => Ok(RunStatus::Succeeded),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Rejected lifecycle mutation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal run status transition {from} -> {to}")]
    Illegal { from: RunStatus, to: RunStatus },

    #[error("unknown run status '{0}'")]
    UnknownStatus(String),
}

impl PipelineRun {
    /// Applies a lifecycle transition, stamping `start_dt` on Started and
    /// `end_dt` on a terminal status.
    ///
    /// `end_dt` is written exactly once because terminal states accept no
    /// further transitions.
    pub fn transition(
        &mut self,
        next: RunStatus,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            RunStatus::Started => self.start_dt = Some(at),
            RunStatus::Succeeded | RunStatus::Failed => self.end_dt = Some(at),
            RunStatus::Created => unreachable!("Created is never a transition target"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> PipelineRun {
        PipelineRun {
            id: Uuid::new_v4(),
            run_name: "RUN001".to_string(),
            status: RunStatus::Created,
            create_dt: chrono::Utc::now(),
            start_dt: None,
            end_dt: None,
            output_folder_path: "az://nextflow/webapp-runs/RUN001".to_string(),
            sample_sheet: Vec::new(),
        }
    }

    #[test]
    fn test_normal_path_stamps_timestamps() {
        let mut r = run();

        r.transition(RunStatus::Started, chrono::Utc::now()).unwrap();
        assert!(r.start_dt.is_some());
        assert!(r.end_dt.is_none());

        r.transition(RunStatus::Succeeded, chrono::Utc::now())
            .unwrap();
        assert_eq!(r.status, RunStatus::Succeeded);
        assert!(r.end_dt.is_some());
    }

    #[test]
    fn test_created_to_failed_short_circuit() {
        let mut r = run();

        r.transition(RunStatus::Failed, chrono::Utc::now()).unwrap();
        assert_eq!(r.status, RunStatus::Failed);
        assert!(r.start_dt.is_none(), "run that never started has no start_dt");
        assert!(r.end_dt.is_some());
    }

    #[test]
    fn test_terminal_states_reject_further_transitions() {
        let mut r = run();
        r.transition(RunStatus::Started, chrono::Utc::now()).unwrap();
        r.transition(RunStatus::Failed, chrono::Utc::now()).unwrap();

        let end_dt = r.end_dt;
        for next in [RunStatus::Started, RunStatus::Succeeded, RunStatus::Failed] {
            assert!(r.transition(next, chrono::Utc::now()).is_err());
        }
        assert_eq!(r.end_dt, end_dt, "end_dt written exactly once");
    }

    #[test]
    fn test_created_cannot_skip_to_succeeded() {
        let mut r = run();
        assert_eq!(
            r.transition(RunStatus::Succeeded, chrono::Utc::now()),
            Err(TransitionError::Illegal {
                from: RunStatus::Created,
                to: RunStatus::Succeeded,
            })
        );
        assert!(r.end_dt.is_none());
    }

    #[test]
    fn test_status_round_trips_as_string() {
        for status in [
            RunStatus::Created,
            RunStatus::Started,
            RunStatus::Succeeded,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("Running".parse::<RunStatus>().is_err());
    }
}
