// Our custom logging macros.
use crate::log_warn;
// The 'colored' crate helps us make our console output readable.
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves paths that start with a tilde `~` to the user's home directory.
///
/// # Arguments
/// * `path`: the path, possibly starting with `~`.
///
/// # Returns
/// * `PathBuf`: the resolved path, or the input unchanged when no home directory is known.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return PathBuf::from(path.replacen('~', &home.to_string_lossy(), 1));
        }
    }
    PathBuf::from(path)
}

/// Expands `~` and environment variables (`$HOME`, `${XDG_DATA_HOME}`) in a user supplied path.
/// Unknown variables are left in place with a warning rather than failing the run.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            log_warn!(
                "[Paths] Could not expand '{}': {}. Using it with only '~' resolved.",
                path.yellow(),
                e
            );
            expand_tilde(path)
        }
    }
}

/// `true` when `dir` exists and contains at least one entry.
pub fn is_populated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Names of the direct children of `dir`, sorted. Used to describe layouts in errors.
pub fn list_top_level(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
