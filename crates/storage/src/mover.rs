//! Relocates image/sidecar/thumbnail triples between dataset trees.
//!
//! The image is the authoritative artifact. Sidecar and thumbnail moves are
//! attempted independently and their failures never abort the operation.

use crate::layout::{validate_filename, DatasetLayout, Tree};
use crate::sidecar;
use crate::{Result, StorageError};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub image: bool,
    pub sidecar: bool,
    pub thumbnail: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub exported: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

/// Moves `filename` and its companions from one tree to another.
pub async fn move_item(
    layout: &DatasetLayout,
    filename: &str,
    from: Tree,
    to: Tree,
) -> Result<MoveReport> {
    validate_filename(filename)?;
    let thumbs = layout.thumbnails(to);
    fs::create_dir_all(&thumbs)
        .await
        .map_err(|e| StorageError::io(&thumbs, e))?;

    let mut report = MoveReport::default();
    match relocate(
        &layout.image_path(from, filename),
        &layout.image_path(to, filename),
    )
    .await
    {
        Ok(()) => report.image = true,
        Err(e) => warn!(%filename, "image move failed: {}", e),
    }
    match relocate(
        &layout.sidecar_path(from, filename),
        &layout.sidecar_path(to, filename),
    )
    .await
    {
        Ok(()) => report.sidecar = true,
        Err(e) => debug!(%filename, "sidecar not moved: {}", e),
    }
    match relocate(
        &layout.thumbnail_path(from, filename),
        &layout.thumbnail_path(to, filename),
    )
    .await
    {
        Ok(()) => report.thumbnail = true,
        Err(e) => debug!(%filename, "thumbnail not moved: {}", e),
    }
    info!(%filename, ?from, ?to, "moved");
    Ok(report)
}

pub async fn reject(layout: &DatasetLayout, filename: &str) -> Result<MoveReport> {
    move_item(layout, filename, Tree::Active, Tree::Rejected).await
}

pub async fn restore(layout: &DatasetLayout, filename: &str) -> Result<MoveReport> {
    move_item(layout, filename, Tree::Rejected, Tree::Active).await
}

/// Rename, falling back to copy + remove when the trees sit on different
/// filesystems.
async fn relocate(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(e),
        Err(rename_err) => {
            if fs::copy(from, to).await.is_err() {
                return Err(rename_err);
            }
            fs::remove_file(from).await
        }
    }
}

/// Copies images into the final tree with sidecars stripped of pseudo-tags.
pub async fn export_final(layout: &DatasetLayout, filenames: &[String]) -> Result<ExportSummary> {
    let final_dir = layout.dir(Tree::Final);
    fs::create_dir_all(final_dir)
        .await
        .map_err(|e| StorageError::io(final_dir, e))?;

    let mut summary = ExportSummary::default();
    for filename in filenames {
        if validate_filename(filename).is_err() {
            summary.failed.push(filename.clone());
            continue;
        }
        let src = layout.image_path(Tree::Active, filename);
        if !fs::try_exists(&src).await.unwrap_or(false) {
            summary.missing.push(filename.clone());
            continue;
        }
        if let Err(e) = fs::copy(&src, layout.image_path(Tree::Final, filename)).await {
            warn!(%filename, "export copy failed: {}", e);
            summary.failed.push(filename.clone());
            continue;
        }
        let tags = sidecar::read_tags(&layout.sidecar_path(Tree::Active, filename))
            .await
            .unwrap_or_else(|e| {
                warn!(%filename, "exporting without tags: {}", e);
                Default::default()
            });
        let dest = layout.sidecar_path(Tree::Final, filename);
        if let Err(e) = sidecar::write_tags(&dest, &tags.without_pseudo()).await {
            warn!(%filename, "export sidecar failed: {}", e);
            summary.failed.push(filename.clone());
            continue;
        }
        summary.exported.push(filename.clone());
    }
    info!(
        exported = summary.exported.len(),
        missing = summary.missing.len(),
        failed = summary.failed.len(),
        "final dataset export finished"
    );
    Ok(summary)
}

/// Deletes an image; its sidecar and thumbnail are removed best-effort.
pub async fn delete_item(layout: &DatasetLayout, tree: Tree, filename: &str) -> Result<()> {
    validate_filename(filename)?;
    let image = layout.image_path(tree, filename);
    match fs::remove_file(&image).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StorageError::NotFound(filename.to_string()))
        }
        Err(e) => return Err(StorageError::io(&image, e)),
    }
    let _ = fs::remove_file(layout.sidecar_path(tree, filename)).await;
    let _ = fs::remove_file(layout.thumbnail_path(tree, filename)).await;
    info!(%filename, ?tree, "deleted");
    Ok(())
}
