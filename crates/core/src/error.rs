use providers::ScorerError;
use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a batch job is already in progress")]
    Conflict,
    #[error("no batch job is currently running")]
    NotRunning,
    #[error("{0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Scorer(#[from] ScorerError),
}

pub type Result<T> = std::result::Result<T, JobError>;
