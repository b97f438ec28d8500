//! HTTP surface of the dataset curator.
pub mod routes;
pub mod server;
