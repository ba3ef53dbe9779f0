//! Artifactory access
//!
//! [`ArtifactoryService`] is the seam between business logic and the REST
//! API; [`ArtifactoryClient`] is its HTTP implementation.

pub mod client;
pub mod service;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use client::ArtifactoryClient;
pub use service::ArtifactoryService;
pub use types::*;
