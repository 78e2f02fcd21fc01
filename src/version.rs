//! Build identity reported by the `heimdall` CLI and logged at gateway startup.

/// Crate version as published.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
const COMMIT: Option<&str> = option_env!("VERGEN_GIT_SHA");
const DIRTY: Option<&str> = option_env!("VERGEN_GIT_DIRTY");

/// Abbreviated commit hash, at most seven characters.
fn short_commit() -> &'static str {
    let commit = COMMIT.unwrap_or("unknown");
    commit.get(..7).unwrap_or(commit)
}

/// `PKG_VERSION` tagged with the source checkout the gateway was built from,
/// e.g. `0.1.0+main.1a2b3c4`, with `.dirty` appended for uncommitted builds.
/// Missing git data shows up as `unknown`.
pub fn version_string() -> String {
    let branch = BRANCH.unwrap_or("unknown");
    let mut version = format!("{PKG_VERSION}+{branch}.{}", short_commit());
    if DIRTY == Some("true") {
        version.push_str(".dirty");
    }
    version
}
