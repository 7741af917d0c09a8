use crate::consolidate::{MigrationProgress, MigrationStep};
use crate::model::EntityKind;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("destination campus {campus_id} is locked by another migration ({holder})")]
    Locked { campus_id: String, holder: String },

    #[error("invalid consolidation plan: {0}")]
    InvalidPlan(String),

    #[error("campus selector {selector:?} is ambiguous: {candidates}")]
    AmbiguousSelector { selector: String, candidates: String },

    #[error("migration aborted during {step}: {source}")]
    MigrationFailed {
        step: MigrationStep,
        progress: MigrationProgress,
        #[source]
        source: Box<RepairError>,
    },
}

impl RepairError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RepairError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable error code shared by the IPC protocol and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            RepairError::NotFound { .. } => "not_found",
            RepairError::IntegrityViolation(_) => "integrity_violation",
            RepairError::Store(_) => "db_query_failed",
            RepairError::Locked { .. } => "locked",
            RepairError::InvalidPlan(_) | RepairError::AmbiguousSelector { .. } => "bad_params",
            RepairError::MigrationFailed { .. } => "migration_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, RepairError>;
