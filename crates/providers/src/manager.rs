//! Owns the single scorer process: lazy spawn, reuse, and teardown.

use crate::channel::LineChannel;
use crate::kind::{ScorerKind, ScorerSettings};
use crate::{ScoreProvider, ScorerError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct ActiveScorer {
    kind: ScorerKind,
    channel: Arc<LineChannel>,
}

/// At most one scorer process exists at a time. Asking for a different kind
/// tears the current one down and spawns a replacement.
pub struct ScorerManager {
    settings: ScorerSettings,
    active: Mutex<Option<ActiveScorer>>,
}

impl ScorerManager {
    pub fn new(settings: ScorerSettings) -> Self {
        Self {
            settings,
            active: Mutex::new(None),
        }
    }

    pub async fn current_kind(&self) -> Option<ScorerKind> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|a| !a.channel.is_closed())
            .map(|a| a.kind)
    }

    /// Returns a ready channel for `kind`, spawning one if needed.
    pub async fn ensure_ready(&self, kind: ScorerKind) -> Result<Arc<LineChannel>, ScorerError> {
        let channel = {
            let mut active = self.active.lock().await;
            match active.as_ref() {
                Some(current) if current.kind == kind && !current.channel.is_closed() => {
                    current.channel.clone()
                }
                _ => {
                    if let Some(old) = active.take() {
                        info!(from = %old.kind, to = %kind, "replacing scorer");
                        old.channel.terminate();
                    }
                    let command = self.settings.command_for(kind);
                    let channel = LineChannel::spawn(
                        kind.label(),
                        &command,
                        &self.settings.ready_marker,
                        self.settings.working_dir.as_deref(),
                    )?;
                    *active = Some(ActiveScorer {
                        kind,
                        channel: channel.clone(),
                    });
                    channel
                }
            }
        };

        // The slot lock is released here so concurrent callers share one wait.
        if let Err(e) = channel.wait_ready(self.settings.ready_timeout).await {
            warn!(scorer = %kind, "scorer failed to start: {}", e);
            self.discard(&channel).await;
            return Err(e);
        }
        Ok(channel)
    }

    /// Sends `image` to the attached process without spawning one.
    pub async fn request_score(&self, image: &Path) -> Result<String, ScorerError> {
        let channel = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.channel.clone())
            .ok_or(ScorerError::NotAttached)?;
        self.request_on(&channel, image).await
    }

    async fn request_on(
        &self,
        channel: &Arc<LineChannel>,
        image: &Path,
    ) -> Result<String, ScorerError> {
        let payload = image.to_string_lossy();
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, channel.request(&payload)).await {
            Ok(Ok(line)) => Ok(line.trim().to_string()),
            Ok(Err(e)) => {
                if channel.is_closed() {
                    self.discard(channel).await;
                }
                Err(e)
            }
            Err(_) => {
                // A late answer would be paired with the next request, so the
                // process cannot be reused after a timeout.
                warn!(image = %image.display(), "scorer request timed out");
                self.discard(channel).await;
                Err(ScorerError::RequestTimeout(timeout))
            }
        }
    }

    /// Kills the attached process, if any, rejecting its queued requests.
    pub async fn terminate(&self) {
        if let Some(active) = self.active.lock().await.take() {
            info!(scorer = %active.kind, "terminating scorer");
            active.channel.terminate();
        }
    }

    async fn discard(&self, channel: &Arc<LineChannel>) {
        let mut active = self.active.lock().await;
        if matches!(active.as_ref(), Some(a) if Arc::ptr_eq(&a.channel, channel)) {
            *active = None;
        }
        drop(active);
        channel.terminate();
    }
}

#[async_trait::async_trait]
impl ScoreProvider for ScorerManager {
    async fn score(&self, kind: ScorerKind, image: &Path) -> Result<String, ScorerError> {
        let channel = self.ensure_ready(kind).await?;
        self.request_on(&channel, image).await
    }

    async fn shutdown(&self) {
        self.terminate().await;
    }
}
