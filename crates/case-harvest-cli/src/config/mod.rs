//! Configuration loading and resolution.
//!
//! Every setting resolves as: explicit flag, then environment variable, then
//! default.

use std::path::PathBuf;

pub const OUTPUT_ENV: &str = "CASE_HARVEST_OUTPUT";
pub const DB_ENV: &str = "CASE_HARVEST_DB";
pub const SOLVER_URL_ENV: &str = "CASE_HARVEST_SOLVER_URL";

fn from_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the output root for case directories.
pub fn resolve_output_root(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Some(path) = from_env(OUTPUT_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from("cases")
}

/// Resolve the SQLite database path.
pub fn resolve_database(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Some(path) = from_env(DB_ENV) {
        return PathBuf::from(path);
    }
    case_harvest::sink::SqliteSink::default_path()
}

/// Resolve the remote solver endpoint. `None` means prompt interactively.
pub fn resolve_solver_url(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| from_env(SOLVER_URL_ENV))
}
