use tempo_core::{Severity, SimTime};
use tempo_sync::SyncError;
use thiserror::Error;

use crate::phase::PhaseId;

/// Errors raised while assembling or running a phase schedule.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("unknown phase id {0}")]
    UnknownPhase(PhaseId),

    #[error("unknown phase '{0}'")]
    UnknownPhaseName(String),

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("unknown component id {0}")]
    UnknownComponent(usize),

    #[error("phase '{name}' appears twice in domain '{domain}'")]
    DuplicatePhase { domain: String, name: String },

    #[error("phase '{name}' already belongs to domain '{domain}'")]
    AlreadyInDomain { domain: String, name: String },

    #[error("domain '{0}' already exists")]
    DuplicateDomain(String),

    #[error("component '{parent}' already has a child named '{name}'")]
    DuplicateComponent { parent: String, name: String },

    #[error("phase '{0}' is not assigned to any domain")]
    Unassigned(String),

    #[error("circular phase dependency: {0}")]
    Cycle(String),

    #[error("cannot jump from '{from}' to '{to}': no path between them")]
    UnreachableJump { from: String, to: String },

    #[error("phase '{phase}' exceeded {iterations} ready-to-end iterations")]
    ObjectionOverflow { phase: String, iterations: u32 },

    #[error("run aborted by {id}: {message}")]
    Fatal { id: String, message: String },

    #[error("run timed out at {0}")]
    Timeout(SimTime),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Failure returned by a component's phase action.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Severity the failure is reported at.
    pub fn severity(&self) -> Severity {
        match self {
            ActionError::Fatal(_) => Severity::Fatal,
            ActionError::Failed(_) | ActionError::Other(_) => Severity::Error,
        }
    }
}

impl From<SyncError> for ActionError {
    fn from(err: SyncError) -> Self {
        ActionError::Failed(err.to_string())
    }
}

impl From<PhaseError> for ActionError {
    fn from(err: PhaseError) -> Self {
        ActionError::Failed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PhaseError>;
