//! Version gates
//!
//! Package managers and Artifactory report versions that are not always
//! strict semver (`7.41`, `7.77.3-SNAPSHOT`, `v10.2.4`). Versions are parsed
//! leniently and compared with `semver`.

use semver::Version;

use crate::error::BridgeError;

/// Current rtbridge version from Cargo.toml
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit the binary was built from, when the build saw a git checkout
pub const BUILD_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");

/// `User-Agent` sent to Artifactory
pub fn user_agent() -> String {
    match BUILD_SHA {
        Some(sha) => format!("rtbridge/{CURRENT_VERSION} ({})", &sha[..sha.len().min(8)]),
        None => format!("rtbridge/{CURRENT_VERSION}"),
    }
}

/// Parse a version, padding missing components and dropping build suffixes
///
/// Returns `None` when no leading numeric component exists.
pub fn parse_lenient(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches(['v', '=']);
    if let Ok(parsed) = Version::parse(trimmed) {
        return Some(parsed);
    }
    let numeric: Vec<u64> = trimmed
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .next()?
        .split('.')
        .filter(|part| !part.is_empty())
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match numeric.as_slice() {
        [] => None,
        [major] => Some(Version::new(*major, 0, 0)),
        [major, minor] => Some(Version::new(*major, *minor, 0)),
        [major, minor, patch, ..] => Some(Version::new(*major, *minor, *patch)),
    }
}

/// Whether `found` is at least `required`; unparseable versions never are
pub fn at_least(found: &str, required: &str) -> bool {
    match (parse_lenient(found), parse_lenient(required)) {
        (Some(found), Some(required)) => found >= required,
        _ => false,
    }
}

/// Fail with *UnsupportedTool* when a package manager is too old
pub fn require_tool_version(tool: &str, found: &Version, required: &str) -> Result<(), BridgeError> {
    if at_least(&found.to_string(), required) {
        return Ok(());
    }
    Err(BridgeError::UnsupportedTool(format!(
        "rtbridge {tool} commands require {tool} client version {required} or higher. The current version is: {found}"
    )))
}

/// Fail with *UnsupportedVersion* when an Artifactory instance is too old
pub fn require_artifactory_version(feature: &str, found: &str, required: &str) -> Result<(), BridgeError> {
    if at_least(found, required) {
        return Ok(());
    }
    Err(BridgeError::UnsupportedVersion {
        feature: feature.to_string(),
        required: required.to_string(),
        found: found.to_string(),
    })
}
