use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Version assigned when nothing usable exists to increment from
pub const INITIAL_VERSION: &str = "1.0.0";

/// Which semantic-version component a new handler version bumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Major,
    Minor,
    #[default]
    Patch,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Major => write!(f, "major"),
            ChangeKind::Minor => write!(f, "minor"),
            ChangeKind::Patch => write!(f, "patch"),
        }
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(ChangeKind::Major),
            "minor" => Ok(ChangeKind::Minor),
            "patch" => Ok(ChangeKind::Patch),
            other => Err(format!("unknown change type '{}', expected major|minor|patch", other)),
        }
    }
}

fn parse(version: Option<&str>) -> Option<Version> {
    let raw = version?.trim();
    if raw.is_empty() {
        return None;
    }
    match Version::parse(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Unparsable handler version '{}': {}", raw, e);
            None
        }
    }
}

/// Compare a local version against a remote one using semver precedence.
///
/// Fails open: when either side is missing or unparsable the local side is
/// reported as older (`Ordering::Less`), which callers read as "update needed".
pub fn compare_versions(local: Option<&str>, remote: Option<&str>) -> Ordering {
    match (parse(local), parse(remote)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Less,
    }
}

/// Ordering key for picking the newest of several versions; unparsable sorts lowest
pub fn version_key(version: &str) -> Option<Version> {
    Version::parse(version.trim()).ok()
}

/// True if either version is missing/unparsable, or `remote` is strictly greater
pub fn is_update_needed(local: Option<&str>, remote: Option<&str>) -> bool {
    compare_versions(local, remote) == Ordering::Less
}

/// Standard semver increment; anything absent or unparsable restarts at `1.0.0`
pub fn increment_version(current: Option<&str>, kind: ChangeKind) -> String {
    let Some(v) = parse(current) else {
        return INITIAL_VERSION.to_string();
    };

    let next = match kind {
        ChangeKind::Major => Version::new(v.major + 1, 0, 0),
        ChangeKind::Minor => Version::new(v.major, v.minor + 1, 0),
        ChangeKind::Patch if v.pre.is_empty() => Version::new(v.major, v.minor, v.patch + 1),
        // a pre-release patch bump releases the version it precedes
        ChangeKind::Patch => Version::new(v.major, v.minor, v.patch),
    };
    next.to_string()
}
