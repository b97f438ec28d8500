//! Top-level dataset operations outside the per-file batch loop.

use crate::coordinator::BatchCoordinator;
use crate::error::{JobError, Result};
use providers::ScorerKind;
use storage::layout::validate_filename;
use storage::mover::{self, ExportSummary, MoveReport};
use storage::tags::{RATING_PREFIX, SCORE_PREFIX};
use storage::{sidecar, DatasetLayout, TagSet, Tree};
use tokio::fs;
use tracing::{info, warn};

async fn require_image(layout: &DatasetLayout, tree: Tree, filename: &str) -> Result<()> {
    validate_filename(filename).map_err(|e| JobError::Invalid(e.to_string()))?;
    if fs::try_exists(layout.image_path(tree, filename))
        .await
        .unwrap_or(false)
    {
        Ok(())
    } else {
        Err(JobError::NotFound(filename.to_string()))
    }
}

/// Tags one active image with the shared scorer and returns the raw tag line.
/// The sidecar is not touched.
pub async fn autotag_single(
    coordinator: &BatchCoordinator,
    filename: &str,
    threshold: Option<f32>,
) -> Result<String> {
    if coordinator.is_running() {
        return Err(JobError::Conflict);
    }
    let layout = coordinator.layout();
    require_image(layout, Tree::Active, filename).await?;
    let threshold = threshold.unwrap_or_else(|| coordinator.default_threshold());
    let image = fs::canonicalize(layout.image_path(Tree::Active, filename))
        .await
        .map_err(|_| JobError::NotFound(filename.to_string()))?;
    let line = coordinator
        .score_single(ScorerKind::Tagger { threshold }, &image)
        .await?;
    info!(%filename, threshold, "autotagged single image");
    Ok(line)
}

/// Replaces a sidecar with user-edited text, normalized through a tag set.
pub async fn save_content(
    layout: &DatasetLayout,
    tree: Tree,
    filename: &str,
    content: &str,
) -> Result<TagSet> {
    validate_filename(filename).map_err(|e| JobError::Invalid(e.to_string()))?;
    let mut tags = TagSet::parse(content);
    tags.normalize_pseudo();
    sidecar::write_tags(&layout.sidecar_path(tree, filename), &tags).await?;
    Ok(tags)
}

/// Sets `rating:<1-3>` on an active image, or removes it for `None`.
pub async fn set_rating(
    layout: &DatasetLayout,
    filename: &str,
    rating: Option<u8>,
) -> Result<TagSet> {
    if let Some(r) = rating {
        if !(1..=3).contains(&r) {
            return Err(JobError::Invalid(format!("rating must be 1-3, got {}", r)));
        }
    }
    require_image(layout, Tree::Active, filename).await?;
    let path = layout.sidecar_path(Tree::Active, filename);
    let mut tags = sidecar::read_tags(&path).await?;
    match rating {
        Some(r) => tags.upsert_pseudo(RATING_PREFIX, &r.to_string()),
        None => {
            tags.strip_prefix(RATING_PREFIX);
        }
    }
    sidecar::write_tags(&path, &tags).await?;
    Ok(tags)
}

pub async fn delete_tag(layout: &DatasetLayout, tag: &str) -> Result<usize> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(JobError::Invalid("tag must not be empty".into()));
    }
    let changed = sidecar::delete_tag_everywhere(
        layout.dir(Tree::Active),
        layout.sidecar_extension(),
        tag,
    )
    .await?;
    info!(tag, changed, "tag deleted from dataset");
    Ok(changed)
}

pub async fn clear_ratings(layout: &DatasetLayout) -> Result<usize> {
    clear_prefix(layout, RATING_PREFIX).await
}

pub async fn clear_aesthetic_scores(layout: &DatasetLayout) -> Result<usize> {
    clear_prefix(layout, SCORE_PREFIX).await
}

async fn clear_prefix(layout: &DatasetLayout, prefix: &str) -> Result<usize> {
    let changed = sidecar::strip_prefix_everywhere(
        layout.dir(Tree::Active),
        layout.sidecar_extension(),
        prefix,
    )
    .await?;
    info!(prefix, changed, "pseudo-tags cleared");
    Ok(changed)
}

pub async fn reject(layout: &DatasetLayout, filename: &str) -> Result<MoveReport> {
    require_image(layout, Tree::Active, filename).await?;
    Ok(mover::reject(layout, filename).await?)
}

pub async fn restore(layout: &DatasetLayout, filename: &str) -> Result<MoveReport> {
    require_image(layout, Tree::Rejected, filename).await?;
    Ok(mover::restore(layout, filename).await?)
}

pub async fn delete_media(layout: &DatasetLayout, filename: &str) -> Result<()> {
    validate_filename(filename).map_err(|e| JobError::Invalid(e.to_string()))?;
    match mover::delete_item(layout, Tree::Active, filename).await {
        Err(storage::StorageError::NotFound(name)) => Err(JobError::NotFound(name)),
        other => Ok(other?),
    }
}

/// Rejects every listed image whose aesthetic score is strictly below
/// `threshold`. Unscored images are kept.
pub async fn reject_by_score(
    layout: &DatasetLayout,
    filenames: &[String],
    threshold: f32,
) -> Result<Vec<String>> {
    let mut rejected = Vec::new();
    for filename in filenames {
        if validate_filename(filename).is_err() {
            continue;
        }
        let tags = match sidecar::read_tags(&layout.sidecar_path(Tree::Active, filename)).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(%filename, "score unreadable, kept: {}", e);
                continue;
            }
        };
        let Some(score) = tags.aesthetic_score() else {
            continue;
        };
        if score < threshold {
            match mover::reject(layout, filename).await {
                Ok(report) if report.image => rejected.push(filename.clone()),
                Ok(_) => {}
                Err(e) => warn!(%filename, "reject failed, kept: {}", e),
            }
        }
    }
    info!(threshold, rejected = rejected.len(), "reject by score finished");
    Ok(rejected)
}

pub async fn export_final_dataset(
    layout: &DatasetLayout,
    filenames: &[String],
) -> Result<ExportSummary> {
    Ok(mover::export_final(layout, filenames).await?)
}
