use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tree {
    Active,
    Rejected,
    Final,
}

/// The three parallel image trees and the naming rules shared by them.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    active: PathBuf,
    rejected: PathBuf,
    final_dir: PathBuf,
    thumbnail_dir: String,
    sidecar_extension: String,
}

impl DatasetLayout {
    pub fn new(
        active: impl Into<PathBuf>,
        rejected: impl Into<PathBuf>,
        final_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            active: active.into(),
            rejected: rejected.into(),
            final_dir: final_dir.into(),
            thumbnail_dir: ".thumbnails".to_string(),
            sidecar_extension: "txt".to_string(),
        }
    }

    /// Default layout: rejected and final trees nested under the active root.
    pub fn under_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.clone(), root.join("_rejected"), root.join("_final"))
    }

    pub fn with_thumbnail_dir(mut self, name: impl Into<String>) -> Self {
        self.thumbnail_dir = name.into();
        self
    }

    pub fn with_sidecar_extension(mut self, ext: impl Into<String>) -> Self {
        self.sidecar_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn dir(&self, tree: Tree) -> &Path {
        match tree {
            Tree::Active => &self.active,
            Tree::Rejected => &self.rejected,
            Tree::Final => &self.final_dir,
        }
    }

    pub fn thumbnails(&self, tree: Tree) -> PathBuf {
        self.thumbnails_in(self.dir(tree))
    }

    pub fn thumbnails_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.thumbnail_dir)
    }

    pub fn sidecar_extension(&self) -> &str {
        &self.sidecar_extension
    }

    pub fn image_path(&self, tree: Tree, filename: &str) -> PathBuf {
        self.dir(tree).join(filename)
    }

    pub fn sidecar_path(&self, tree: Tree, filename: &str) -> PathBuf {
        sidecar_path_in(self.dir(tree), filename, &self.sidecar_extension)
    }

    pub fn thumbnail_path(&self, tree: Tree, filename: &str) -> PathBuf {
        self.thumbnails(tree).join(filename)
    }
}

/// `dir/<stem>.<ext>` for the image named `filename`.
pub fn sidecar_path_in(dir: &Path, filename: &str, ext: &str) -> PathBuf {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    dir.join(format!("{}.{}", stem, ext))
}

/// Rejects names that would escape a tree directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\'])
        || filename.contains('\0');
    if bad {
        return Err(StorageError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
