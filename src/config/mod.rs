//! Configuration constants
//!
//! - [`defaults`] - Version gates, pool sizes, file names and timeouts
//! - [`endpoints`] - Artifactory REST paths

pub mod defaults;
pub mod endpoints;
