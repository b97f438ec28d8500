//! Core library: configuration, the batch job coordinator, dataset
//! operations, media listing and thumbnails.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod media;
pub mod models;
pub mod operations;
pub mod thumbnails;

pub use coordinator::BatchCoordinator;
pub use error::JobError;
