//! Core business logic module
//!
//! # Submodules
//!
//! npm build-info pipeline:
//! - [`rc`] - User-level registry and auth configuration
//! - [`npmrc`] - Temporary project rc for a single run
//! - [`npm`] - npm detection and registry access
//! - [`options`] - Flag extraction from pass-through arguments
//! - [`install`] - `npm install` / `npm ci`
//! - [`dependencies`] - Dependency tree resolution
//! - [`checksums`] - Checksum reconciliation
//! - [`publish`] - `npm publish`
//! - [`native`] - Any other npm command
//! - [`build_info`] - Partial build-info records
//!
//! Other tools:
//! - [`yarn`] - Yarn runs routed to Artifactory
//! - [`terraform`] - Terraform module publishing
//! - [`login`] - npm and yarn login
//!
//! Configuration merge:
//! - [`merge`] - Diff and classification of projects and repositories
//! - [`transfer`] - Transfer-config-merge command
//! - [`precheck`] - Pre-check runner
//! - [`remote_url_check`] - Remote repository connectivity check
//!
//! Shared:
//! - [`server`] - Server references
//! - [`project_config`] - `.jfrog/projects/<tool>.yaml`
//! - [`package_info`] - `package.json` identity
//! - [`version`] - Version gates

pub mod build_info;
pub mod checksums;
pub mod dependencies;
pub mod install;
pub mod login;
pub mod merge;
pub mod native;
pub mod npm;
pub mod npmrc;
pub mod options;
pub mod package_info;
pub mod precheck;
pub mod project_config;
pub mod publish;
pub mod rc;
pub mod remote_url_check;
pub mod server;
pub mod terraform;
pub mod transfer;
pub mod version;
pub mod yarn;
