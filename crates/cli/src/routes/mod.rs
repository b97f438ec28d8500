pub mod autotag;
pub mod files;
pub mod media;
pub mod tags;
