//! Path helpers for config file locations

use std::path::PathBuf;

/// Expand `~` and `~/...` to the home directory. Other paths are returned
/// as given; relative ones resolve against the working directory when used.
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
