//! Single-flight batch job runner.
//!
//! One job at a time walks its file list on a spawned task. Progress lives in
//! a shared [`BatchJobState`] that status readers copy out. Each accepted job
//! gets a new generation number; a worker only touches the state while its
//! generation is current, so a cancelled worker that is still draining its
//! in-flight file cannot disturb a newer job.
//!
//! The scorer is shut down by whoever holds it last: the job that claimed it,
//! unless a cancel or a newer caller has taken it since.

use crate::error::{JobError, Result};
use crate::models::{BatchJobState, BatchOperation, BatchParams, BatchRequest, JobOutcome};
use chrono::Utc;
use providers::{ScoreProvider, ScorerKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use storage::layout::validate_filename;
use storage::tags::{merge_tags, SCORE_PREFIX};
use storage::{sidecar, DatasetLayout, StorageError, TagSet, Tree};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct JobSlot {
    state: BatchJobState,
    generation: u64,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    slot: Mutex<JobSlot>,
    /// Generation of the job allowed to shut the scorer down, if any.
    scorer_owner: AsyncMutex<Option<u64>>,
    layout: DatasetLayout,
    scorer: Arc<dyn ScoreProvider>,
    default_threshold: f32,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        let slot = self.lock();
        slot.generation == generation && slot.state.is_running
    }

    /// Applies `f` unless a newer job has replaced this one. A cancelled job
    /// still records the file that was in flight when it was cancelled.
    fn update(&self, generation: u64, f: impl FnOnce(&mut BatchJobState)) {
        let mut slot = self.lock();
        if slot.generation == generation {
            f(&mut slot.state);
        }
    }

    /// Marks the job completed. Returns false once a newer job was accepted.
    fn finish(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        if slot.state.is_running {
            slot.state.is_running = false;
            slot.state.outcome = Some(JobOutcome::Completed);
            slot.state.finished_at = Some(Utc::now());
        }
        true
    }

    async fn claim_scorer(&self, generation: u64) {
        *self.scorer_owner.lock().await = Some(generation);
    }

    /// Shuts the scorer down if `generation` still holds it. A claim is
    /// released at most once.
    async fn release_scorer(&self, generation: u64) {
        let mut owner = self.scorer_owner.lock().await;
        if *owner == Some(generation) {
            *owner = None;
            self.scorer.shutdown().await;
        }
    }
}

enum FileOutcome {
    Written,
    Skipped,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

impl BatchCoordinator {
    pub fn new(layout: DatasetLayout, scorer: Arc<dyn ScoreProvider>, default_threshold: f32) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(JobSlot::default()),
                scorer_owner: AsyncMutex::new(None),
                layout,
                scorer,
                default_threshold,
            }),
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.inner.layout
    }

    pub fn default_threshold(&self) -> f32 {
        self.inner.default_threshold
    }

    pub fn status(&self) -> BatchJobState {
        self.inner.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state.is_running
    }

    /// Scores one image outside any batch. Refused while a job runs. Takes
    /// the scorer from the last job so its late cleanup leaves it running.
    pub async fn score_single(&self, kind: ScorerKind, image: &Path) -> Result<String> {
        let mut owner = self.inner.scorer_owner.lock().await;
        if self.is_running() {
            return Err(JobError::Conflict);
        }
        *owner = None;
        Ok(self.inner.scorer.score(kind, image).await?)
    }

    /// Claims the job slot and starts the worker. Returns the initial snapshot.
    pub fn submit(&self, request: BatchRequest) -> Result<BatchJobState> {
        validate(&request)?;
        let BatchRequest {
            filenames,
            operation_type,
            params,
        } = request;

        let mut slot = self.inner.lock();
        if slot.state.is_running {
            return Err(JobError::Conflict);
        }
        slot.generation += 1;
        let generation = slot.generation;
        slot.state = BatchJobState {
            is_running: true,
            total: filenames.len(),
            operation_type: Some(operation_type),
            started_at: Some(Utc::now()),
            ..BatchJobState::default()
        };
        let snapshot = slot.state.clone();

        // A cancelled worker may still be finishing its in-flight file; the new
        // job starts after it so the two never contend for the scorer.
        let previous = slot.worker.take();
        let inner = self.inner.clone();
        slot.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            run(inner, generation, filenames, operation_type, params).await;
        }));
        drop(slot);

        info!(
            operation = ?operation_type,
            total = snapshot.total,
            "batch job accepted"
        );
        Ok(snapshot)
    }

    /// Stops the running job before its next file and shuts the scorer down.
    pub async fn cancel(&self) -> Result<BatchJobState> {
        let (generation, snapshot) = {
            let mut slot = self.inner.lock();
            if !slot.state.is_running {
                return Err(JobError::NotRunning);
            }
            slot.state.is_running = false;
            slot.state.outcome = Some(JobOutcome::Cancelled);
            slot.state.finished_at = Some(Utc::now());
            (slot.generation, slot.state.clone())
        };
        info!(
            processed = snapshot.processed,
            total = snapshot.total,
            "batch job cancelled"
        );
        self.inner.release_scorer(generation).await;
        Ok(snapshot)
    }
}

fn validate(request: &BatchRequest) -> Result<()> {
    if request.filenames.is_empty() {
        return Err(JobError::Invalid("no filenames provided".into()));
    }
    if request.operation_type == BatchOperation::FindReplace {
        let find = request.params.tag_to_find.as_deref().unwrap_or("").trim();
        if find.is_empty() {
            return Err(JobError::Invalid("tagToFind is required for find_replace".into()));
        }
    }
    if let Some(threshold) = request.params.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(JobError::Invalid(format!(
                "threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
    }
    for filename in &request.filenames {
        validate_filename(filename).map_err(|e| JobError::Invalid(e.to_string()))?;
    }
    Ok(())
}

async fn run(
    inner: Arc<Inner>,
    generation: u64,
    filenames: Vec<String>,
    operation: BatchOperation,
    params: BatchParams,
) {
    if operation.uses_scorer() {
        inner.claim_scorer(generation).await;
    }
    for filename in &filenames {
        if !inner.is_current(generation) {
            debug!(generation, "batch worker stopping");
            break;
        }
        inner.update(generation, |s| s.current_file = filename.clone());

        let outcome = process_file(&inner, operation, &params, filename).await;
        match &outcome {
            Ok(FileOutcome::Written) => debug!(%filename, "batch item done"),
            Ok(FileOutcome::Skipped) => info!(%filename, "batch item skipped"),
            Err(e) => warn!(%filename, "batch item failed: {}", e),
        }
        inner.update(generation, |s| {
            s.processed += 1;
            match outcome {
                Ok(FileOutcome::Skipped) => s.skipped += 1,
                Err(_) => s.failed += 1,
                Ok(FileOutcome::Written) => {}
            }
        });
    }

    let current = inner.finish(generation);
    inner.release_scorer(generation).await;
    if current {
        let state = inner.lock().state.clone();
        info!(
            processed = state.processed,
            failed = state.failed,
            skipped = state.skipped,
            outcome = ?state.outcome,
            "batch job finished"
        );
    }
}

async fn process_file(
    inner: &Inner,
    operation: BatchOperation,
    params: &BatchParams,
    filename: &str,
) -> Result<FileOutcome> {
    let image = inner.layout.image_path(Tree::Active, filename);
    if !fs::try_exists(&image).await.unwrap_or(false) {
        return Ok(FileOutcome::Skipped);
    }
    let sidecar_path = inner.layout.sidecar_path(Tree::Active, filename);

    match operation {
        BatchOperation::Autotag => {
            let threshold = params.threshold.unwrap_or(inner.default_threshold);
            let image = absolute(&image).await?;
            let line = inner
                .scorer
                .score(ScorerKind::Tagger { threshold }, &image)
                .await?;
            let existing = sidecar::read_tags(&sidecar_path).await?;
            let merged = merge_tags(
                &existing,
                &TagSet::parse(&line),
                params.custom_tag.as_deref(),
                params.mode,
            );
            sidecar::write_tags(&sidecar_path, &merged).await?;
        }
        BatchOperation::RateGeneral | BatchOperation::RateAnime => {
            let kind = if operation == BatchOperation::RateGeneral {
                ScorerKind::GeneralRater
            } else {
                ScorerKind::AnimeRater
            };
            let image = absolute(&image).await?;
            let line = inner.scorer.score(kind, &image).await?;
            let score = parse_score(&line)?;
            let mut tags = sidecar::read_tags(&sidecar_path).await?;
            tags.upsert_pseudo(SCORE_PREFIX, score);
            sidecar::write_tags(&sidecar_path, &tags).await?;
        }
        BatchOperation::FindReplace => {
            let find = params.tag_to_find.as_deref().unwrap_or("").trim();
            let mut tags = sidecar::read_tags(&sidecar_path).await?;
            let Some(position) = tags.remove_ignore_case(find) else {
                return Ok(FileOutcome::Skipped);
            };
            if let Some(replacement) = params
                .tag_to_replace
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
            {
                tags.insert_at(position, replacement);
                tags.normalize_pseudo();
            }
            sidecar::write_tags(&sidecar_path, &tags).await?;
        }
    }
    Ok(FileOutcome::Written)
}

/// Scorers run with their own working directory, so they get absolute paths.
async fn absolute(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).await.map_err(|source| {
        JobError::Storage(StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    })
}

/// Validates a rater's answer; the trimmed text is what gets stored.
pub(crate) fn parse_score(line: &str) -> Result<&str> {
    let trimmed = line.trim();
    match trimmed.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(trimmed),
        _ => Err(JobError::Invalid(format!(
            "scorer returned a non-numeric score: {:?}",
            line
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_must_be_numeric() {
        assert_eq!(parse_score(" 6.25\n").unwrap(), "6.25");
        assert!(parse_score("0").is_ok());
        assert!(parse_score("error").is_err());
        assert!(parse_score("").is_err());
        assert!(parse_score("NaN").is_err());
    }

    #[test]
    fn find_replace_requires_a_tag() {
        let request = BatchRequest {
            filenames: vec!["a.png".into()],
            operation_type: BatchOperation::FindReplace,
            params: BatchParams {
                tag_to_find: Some("  ".into()),
                ..BatchParams::default()
            },
        };
        assert!(matches!(validate(&request), Err(JobError::Invalid(_))));
    }

    #[test]
    fn path_like_filenames_are_refused() {
        let request = BatchRequest {
            filenames: vec!["../secret.png".into()],
            operation_type: BatchOperation::Autotag,
            params: BatchParams::default(),
        };
        assert!(matches!(validate(&request), Err(JobError::Invalid(_))));
    }
}
