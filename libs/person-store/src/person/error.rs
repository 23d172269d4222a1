use std::fmt;

use thiserror::Error;

use crate::DbError;

/// Insert step of a save, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStep {
    InsertPerson,
    InsertPhone,
    InsertAddress,
    InsertAddressJoin,
}

impl fmt::Display for SaveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveStep::InsertPerson => "insert person",
            SaveStep::InsertPhone => "insert phone number",
            SaveStep::InsertAddress => "insert address",
            SaveStep::InsertAddressJoin => "insert address_join",
        })
    }
}

#[derive(Debug, Error)]
pub enum PersonError {
    #[error("invalid person id {0}: must be positive")]
    InvalidId(i64),

    #[error("person {0} not found")]
    NotFound(i64),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] DbError),

    #[error("failed to {step}: {source}")]
    Step {
        step: SaveStep,
        #[source]
        source: DbError,
    },

    /// Rollback after a failed step failed too; `original` is the step failure.
    #[error("failed to rollback transaction: {source} (after: {original})")]
    Rollback {
        #[source]
        source: DbError,
        original: Box<PersonError>,
    },

    #[error("failed to commit person info: {0}")]
    Commit(#[source] DbError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl PersonError {
    pub(super) fn step(step: SaveStep) -> impl FnOnce(DbError) -> Self {
        move |source| PersonError::Step { step, source }
    }

    /// The step whose failure aborted a save, looking through a failed rollback.
    #[must_use]
    pub fn failed_step(&self) -> Option<SaveStep> {
        match self {
            PersonError::Step { step, .. } => Some(*step),
            PersonError::Rollback { original, .. } => original.failed_step(),
            _ => None,
        }
    }
}
