//! Sidecar tag files: read, full-replace writes, and tree-wide rewrites.

use crate::tags::TagSet;
use crate::{Result, StorageError};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Reads raw sidecar content; `None` when the sidecar does not exist.
pub async fn read_content(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Reads the tag set of a sidecar. A missing sidecar is an empty set.
pub async fn read_tags(path: &Path) -> Result<TagSet> {
    Ok(read_content(path)
        .await?
        .map(|c| TagSet::parse(&c))
        .unwrap_or_default())
}

pub async fn write_tags(path: &Path, tags: &TagSet) -> Result<()> {
    write_content(path, &tags.to_content()).await
}

/// Replaces the sidecar with `content` via a temporary sibling and a rename.
pub async fn write_content(path: &Path, content: &str) -> Result<()> {
    let tmp = temp_sibling(path);
    if let Err(e) = fs::write(&tmp, content).await {
        return Err(StorageError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sidecar".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Lists sidecar files directly inside `dir`. A missing directory yields none.
pub async fn list_sidecars(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if matches_ext && is_file {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Applies `edit` to every sidecar in `dir`, writing back only the files it
/// reports as changed. Per-file failures are logged and skipped.
pub async fn rewrite_all<F>(dir: &Path, ext: &str, mut edit: F) -> Result<usize>
where
    F: FnMut(&mut TagSet) -> bool,
{
    let mut changed = 0;
    for path in list_sidecars(dir, ext).await? {
        let mut tags = match read_tags(&path).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("skipping unreadable sidecar: {}", e);
                continue;
            }
        };
        if !edit(&mut tags) {
            continue;
        }
        match write_tags(&path, &tags).await {
            Ok(()) => {
                debug!(path = %path.display(), "sidecar rewritten");
                changed += 1;
            }
            Err(e) => warn!("failed to rewrite sidecar: {}", e),
        }
    }
    Ok(changed)
}

/// Removes `tag` (ignoring case) from every sidecar in `dir`.
pub async fn delete_tag_everywhere(dir: &Path, ext: &str, tag: &str) -> Result<usize> {
    rewrite_all(dir, ext, |tags| tags.remove_ignore_case(tag).is_some()).await
}

/// Removes every tag starting with `prefix` from every sidecar in `dir`.
pub async fn strip_prefix_everywhere(dir: &Path, ext: &str, prefix: &str) -> Result<usize> {
    rewrite_all(dir, ext, |tags| tags.strip_prefix(prefix) > 0).await
}

/// Number of sidecars in `dir` carrying each tag, most frequent first.
pub async fn tag_counts(dir: &Path, ext: &str) -> Result<Vec<(String, usize)>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for path in list_sidecars(dir, ext).await? {
        match read_tags(&path).await {
            Ok(tags) => {
                for tag in tags.iter() {
                    *counts.entry(tag.to_string()).or_default() += 1;
                }
            }
            Err(e) => warn!("skipping unreadable sidecar: {}", e),
        }
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(counts)
}
