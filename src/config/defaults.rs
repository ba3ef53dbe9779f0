//! Default configuration values

use std::time::Duration;

/// Minimum npm client version supported by install, ci and publish
pub const MIN_NPM_VERSION: &str = "5.4.0";

/// Minimum Artifactory version exposing the npm auth API
pub const MIN_ARTIFACTORY_NPM_VERSION: &str = "5.5.2";

/// First npm version whose `pack` accepts `--pack-destination`
pub const NPM_PACK_DESTINATION_VERSION: &str = "7.18.0";

/// First npm version that reads host-scoped auth from `npm_config_//host:_auth`
pub const NPM_SCOPED_AUTH_ENV_VERSION: &str = "9.3.1";

/// First npm version that no longer strips a leading `v` or `=` from package versions
pub const NPM_STRICT_VERSION_MAJOR: u64 = 7;

/// Minimum source Artifactory version for a config transfer
pub const MIN_TRANSFER_CONFIG_ARTIFACTORY_VERSION: &str = "6.23.21";

/// Minimum source Artifactory version for transferring projects
pub const MIN_PROJECTS_ARTIFACTORY_VERSION: &str = "7.0.0";

/// Default number of checksum workers
pub const DEFAULT_THREADS: usize = 3;

/// Number of parallel terraform module uploads
pub const TERRAFORM_THREADS: usize = 3;

/// Project-local npm rc file
pub const NPMRC_FILE_NAME: &str = ".npmrc";

/// Backup of a pre-existing project-local rc file
pub const NPMRC_BACKUP_FILE_NAME: &str = "jfrog.npmrc.backup";

/// Build-info property key recording the npm dist-tag
pub const DIST_TAG_PROP_KEY: &str = "npm.disttag";

/// Remote URL check: interval between status polls
pub const REMOTE_CHECK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Remote URL check: overall polling timeout
pub const REMOTE_CHECK_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Remote URL check: retries of the initial POST after a first failed attempt
pub const REMOTE_CHECK_MAX_RETRIES: u32 = 3;

/// Remote URL check: fixed delay between POST attempts
pub const REMOTE_CHECK_RETRY_INTERVAL: Duration = Duration::from_millis(10_000);

/// Repository attributes ignored when comparing source and target (lowercase)
pub const FILTERED_REPO_KEYS: &[&str] = &[
    "url",
    "password",
    "suppresspomconsistencychecks",
    "description",
    "gitregistryurl",
    "cargointernalindex",
];

/// System repositories that are never transferred
pub const BLACKLISTED_REPOSITORIES: &[&str] = &[
    "jfrog-usage-logs",
    "jfrog-billing-logs",
    "jfrog-logs",
    "artifactory-pipe-info",
    "auto-trashcan",
    "jfrog-support-bundle",
    "_intransit",
    "artifactory-edge-uploads",
];

/// File name prefix of the merge conflicts report
pub const CONFLICTS_CSV_PREFIX: &str = "transfer-config-conflicts";

/// File name prefix of the inaccessible remote repositories report
pub const INACCESSIBLE_REPOS_CSV_PREFIX: &str = "inaccessible-repositories";

/// Patterns always excluded from terraform module archives
pub const TERRAFORM_DEFAULT_EXCLUSIONS: &[&str] = &["*.git", "*.DS_Store"];

/// Built-in administrator credentials checked before a transfer
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "password";
