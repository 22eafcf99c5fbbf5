//! Build metadata embedded by `build.rs`

use std::fmt;

/// Compile-time build information
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short commit hash, "unknown" outside a git checkout
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    git_dirty: &'static str,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub host: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    git_hash: env!("ML_SERVICE_GIT_HASH"),
    git_branch: env!("ML_SERVICE_GIT_BRANCH"),
    git_dirty: env!("ML_SERVICE_GIT_DIRTY"),
    build_timestamp: env!("ML_SERVICE_BUILD_TIMESTAMP"),
    target: env!("ML_SERVICE_TARGET"),
    host: env!("ML_SERVICE_HOST"),
    profile: env!("ML_SERVICE_PROFILE"),
    rustc_version: env!("ML_SERVICE_RUSTC_VERSION"),
};

impl BuildInfo {
    pub fn is_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// `0.1.0-abc12345`, with `-dirty` appended for modified checkouts
    pub fn full_version(&self) -> String {
        let suffix = if self.is_dirty() { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, suffix)
    }

    pub fn short_version(&self) -> String {
        format!("{} ({})", self.version, self.git_hash)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "  Commit:   {} ({})", self.git_hash, self.git_branch)?;
        writeln!(f, "  Built:    {} [{}]", self.build_timestamp, self.profile)?;
        writeln!(f, "  Target:   {}", self.target)?;
        writeln!(f, "  Host:     {}", self.host)?;
        writeln!(f, "  Compiler: {}", self.rustc_version)
    }
}
