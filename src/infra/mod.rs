//! Infrastructure layer
//!
//! Handles I/O: filesystem, archives, external processes, CSV reports and
//! process environment. The Artifactory client lives in
//! [`crate::artifactory`].

pub mod archive;
pub mod csv;
pub mod dirs;
pub mod env;
pub mod filesystem;
pub mod process;
