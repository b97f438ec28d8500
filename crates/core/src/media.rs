//! Listing of the images in a dataset tree.

use crate::models::{MediaItem, TagCount};
use anyhow::Context;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use storage::{sidecar, DatasetLayout, TagSet, Tree};
use tokio::task;
use tracing::warn;
use walkdir::WalkDir;

const IMAGE_PATTERNS: [&str; 5] = ["*.jpg", "*.jpeg", "*.png", "*.gif", "*.webp"];

/// URL prefixes under which a tree's images and thumbnails are served.
pub fn mount_points(tree: Tree) -> (&'static str, &'static str) {
    match tree {
        Tree::Active => ("/user-images", "/thumbnails"),
        Tree::Rejected => ("/rejected-images", "/rejected-thumbnails"),
        Tree::Final => ("/final-images", "/final-thumbnails"),
    }
}

pub(crate) fn image_globset() -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in IMAGE_PATTERNS {
        builder.add(GlobBuilder::new(pat).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

/// Image files directly inside `dir`, sorted by name. Subdirectories (the
/// nested trees and the thumbnail directory) are not descended into.
pub(crate) fn image_files(dir: &Path, images: &GlobSet) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| images.is_match(name))
        .collect()
}

pub async fn list_media(layout: &DatasetLayout, tree: Tree) -> anyhow::Result<Vec<MediaItem>> {
    let layout = layout.clone();
    task::spawn_blocking(move || scan_tree(&layout, tree))
        .await
        .context("media listing task failed")?
}

fn scan_tree(layout: &DatasetLayout, tree: Tree) -> anyhow::Result<Vec<MediaItem>> {
    let images = image_globset()?;
    let (image_mount, thumb_mount) = mount_points(tree);
    let mut items = Vec::new();
    for filename in image_files(layout.dir(tree), &images) {
        let sidecar_path = layout.sidecar_path(tree, &filename);
        let content = match fs::read_to_string(&sidecar_path) {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                warn!(path = %sidecar_path.display(), "sidecar unreadable: {}", e);
                String::new()
            }
        };
        let tags = TagSet::parse(&content);
        let dimensions = image::image_dimensions(layout.image_path(tree, &filename)).ok();
        let encoded = urlencoding::encode(&filename);
        items.push(MediaItem {
            image_url: format!("{}/{}", image_mount, encoded),
            thumbnail_url: format!("{}/{}", thumb_mount, encoded),
            rating: tags.rating(),
            aesthetic_score: tags.aesthetic_score(),
            tags: tags.iter().map(str::to_string).collect(),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            content,
            filename,
        });
    }
    Ok(items)
}

/// Tag usage across the active tree, most used first.
pub async fn tag_counts(layout: &DatasetLayout) -> anyhow::Result<Vec<TagCount>> {
    let counts = sidecar::tag_counts(layout.dir(Tree::Active), layout.sidecar_extension())
        .await
        .context("failed to aggregate tags")?;
    Ok(counts
        .into_iter()
        .map(|(name, count)| TagCount { name, count })
        .collect())
}
