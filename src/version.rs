//! Version and build information
//!
//! Provides the version line printed by `--version` for both binaries.

use crate::instrument::Mode;

/// Full version line for `mode`'s binary.
///
/// Returns format: "{tool} (sqlprobe {version}, {commit} {date}) rustc {rustc_version}"
pub fn version(mode: Mode) -> String {
    format!(
        "{} (sqlprobe {}, {} {}) rustc {}",
        mode.tool_name(),
        package_version(),
        build_commit(),
        build_date(),
        rustc_version()
    )
}

/// Get the package version (e.g., "0.4.0")
pub fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns "unknown" if not built inside a git checkout
pub fn build_commit() -> &'static str {
    option_env!("SQLPROBE_COMMIT_SHA").unwrap_or("unknown")
}

pub fn build_date() -> &'static str {
    option_env!("SQLPROBE_BUILD_DATE").unwrap_or("unknown")
}

/// Get the Rust compiler version used for the build
pub fn rustc_version() -> &'static str {
    option_env!("SQLPROBE_RUSTC_VERSION").unwrap_or("unknown")
}
