use crate::config::ThumbnailConfig;
use crate::media::{image_files, image_globset};
use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use storage::{DatasetLayout, Tree};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailSummary {
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
}

/// Creates thumbnails for images in `tree` that have none. Blocking.
pub fn generate_missing(
    layout: &DatasetLayout,
    tree: Tree,
    settings: &ThumbnailConfig,
) -> anyhow::Result<ThumbnailSummary> {
    let images = image_globset()?;
    let dir = layout.dir(tree);
    let thumbs = layout.thumbnails(tree);
    let mut summary = ThumbnailSummary::default();

    let files = image_files(dir, &images);
    if files.is_empty() {
        return Ok(summary);
    }
    fs::create_dir_all(&thumbs)
        .with_context(|| format!("failed to create {}", thumbs.display()))?;

    for filename in files {
        let target = thumbs.join(&filename);
        if target.exists() {
            summary.existing += 1;
            continue;
        }
        match render(&dir.join(&filename), &target, settings) {
            Ok(()) => summary.created += 1,
            Err(e) => {
                warn!(%filename, "thumbnail failed: {:#}", e);
                let _ = fs::remove_file(&target);
                summary.failed += 1;
            }
        }
    }
    info!(
        ?tree,
        created = summary.created,
        existing = summary.existing,
        failed = summary.failed,
        "thumbnails ready"
    );
    Ok(summary)
}

fn render(source: &Path, target: &Path, settings: &ThumbnailConfig) -> anyhow::Result<()> {
    let img = image::open(source).context("decode")?;
    let thumb = img.resize_to_fill(settings.size, settings.size, FilterType::Triangle);
    let file = fs::File::create(target).context("create")?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, settings.quality)
        .encode_image(&thumb.to_rgb8())
        .context("encode")?;
    writer.flush().context("write")?;
    Ok(())
}
