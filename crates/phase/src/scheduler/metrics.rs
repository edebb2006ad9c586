use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tempo_core::{Report, ReportCounts, SimTime};
use uuid::Uuid;

use crate::error::PhaseError;

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Wall-clock start and end.
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Logical time when the run finished.
    pub end_time: SimTime,
    /// Executions per active phase, keyed `domain::name`, in graph order.
    pub executions: IndexMap<String, u32>,
    pub jumps: u32,
    pub reports: ReportCounts,
    /// A FATAL report was raised during the run.
    pub aborted: bool,
    pub timed_out: bool,
    /// The first FATAL report, if any.
    pub fatal: Option<Report>,
}

impl RunSummary {
    /// Executions of the phase `domain::name`; zero when unknown.
    pub fn executions_of(&self, full_name: &str) -> u32 {
        self.executions.get(full_name).copied().unwrap_or(0)
    }

    /// `Ok` for a clean run, the first FATAL as an error otherwise.
    pub fn into_result(self) -> Result<Self, PhaseError> {
        if self.timed_out {
            return Err(PhaseError::Timeout(self.end_time));
        }
        match &self.fatal {
            Some(report) => Err(PhaseError::Fatal {
                id: report.id.clone(),
                message: report.message.clone(),
            }),
            None => Ok(self),
        }
    }
}
