//! Artifactory REST paths, relative to the Artifactory base URL

pub const REPOSITORIES: &str = "api/repositories";
pub const SYSTEM_VERSION: &str = "api/system/version";
pub const SYSTEM_PING: &str = "api/system/ping";
pub const SYSTEM_DECRYPT: &str = "api/system/decrypt";
pub const SYSTEM_ENCRYPT: &str = "api/system/encrypt";
pub const LOCKED_USERS: &str = "api/security/lockedUsers";
pub const UNLOCK_USERS: &str = "api/security/unlockUsers";
pub const NPM_AUTH: &str = "api/npm/auth";
pub const AQL_SEARCH: &str = "api/search/aql";
pub const BUILD: &str = "api/build";
pub const PLUGIN_EXECUTE: &str = "api/plugins/execute";
pub const REMOTE_CHECK_PLUGIN: &str = "remoteRepositoriesCheck";
pub const REMOTE_CHECK_STATUS_PLUGIN: &str = "remoteRepositoriesCheckStatus";

/// Access service paths, relative to the platform base URL
pub const ACCESS_PROJECTS: &str = "access/api/v1/projects";
pub const ACCESS_PING: &str = "access/api/v1/system/ping";
