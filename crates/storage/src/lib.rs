//! Storage layer: sidecar tag files and the dataset directory trees.
//!
//! Holds the tag set model, sidecar read/write helpers and the file mover
//! that relocates image/sidecar/thumbnail triples between trees.

use std::path::PathBuf;
use thiserror::Error;

pub mod layout;
pub mod mover;
pub mod sidecar;
pub mod tags;

pub use layout::{DatasetLayout, Tree};
pub use tags::{MergeMode, TagSet};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
