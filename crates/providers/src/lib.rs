//! Scorer providers: external tagging/rating processes behind a line protocol.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub mod channel;
pub mod kind;
pub mod manager;

pub use channel::LineChannel;
pub use kind::{ScorerCommand, ScorerKind, ScorerSettings};
pub use manager::ScorerManager;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("failed to spawn scorer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("scorer exited before becoming ready: {0}")]
    ExitedBeforeReady(String),
    #[error("scorer not ready after {0:?}")]
    ReadyTimeout(Duration),
    #[error("scorer did not answer within {0:?}")]
    RequestTimeout(Duration),
    #[error("scorer closed prematurely")]
    ClosedPrematurely,
    #[error("no scorer process attached")]
    NotAttached,
    #[error("invalid scorer request: {0}")]
    InvalidRequest(String),
    #[error("scorer io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an image into a tag line or a score line.
#[async_trait::async_trait]
pub trait ScoreProvider: Send + Sync {
    async fn score(&self, kind: ScorerKind, image: &Path) -> Result<String, ScorerError>;

    /// Releases any attached process. Calling it with nothing attached is a no-op.
    async fn shutdown(&self);
}
