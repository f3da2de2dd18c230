//! Build metadata embedded by `build.rs`.

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Git branch at build time, or "unknown" outside a checkout.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => UNKNOWN,
};

/// Git commit SHA at build time, or "unknown" outside a checkout.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => UNKNOWN,
};

const BUILD_TIMESTAMP: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => UNKNOWN,
};

/// Version details reported by `vordr version --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: GIT_BRANCH,
            sha: GIT_SHA,
            dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
            built_at: BUILD_TIMESTAMP,
        }
    }

    /// Seven-character SHA prefix.
    pub fn short_sha(&self) -> &'static str {
        &self.sha[..7.min(self.sha.len())]
    }
}

/// `{version}+{branch}.{sha}`, with a `.dirty` suffix for modified trees.
/// Builds without git metadata report the bare package version.
pub fn version_string() -> String {
    let info = BuildInfo::current();
    if info.sha == UNKNOWN {
        return info.version.to_string();
    }
    let dirty = if info.dirty { ".dirty" } else { "" };
    format!("{}+{}.{}{dirty}", info.version, info.branch, info.short_sha())
}
