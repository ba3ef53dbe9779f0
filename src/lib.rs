//! rtbridge - npm, yarn and terraform against Artifactory
//!
//! This library runs package managers through Artifactory repositories,
//! records build info for what they resolve and publish, and merges
//! projects and repositories between Artifactory instances.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic
//! - [`artifactory`] - Artifactory REST client and its service trait
//! - [`infra`] - Infrastructure layer (filesystem, processes, archives)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod artifactory;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
