// Resolves where devmake reads and writes: install base, profile, applications directory,
// and the optional user framework table. Command line values (or their DEVMAKE_* env
// fallbacks) win over the per-user defaults.

use crate::libs::utilities::path_helpers::expand_path;
use crate::schemas::errors::InstallError;
use crate::log_debug;
use colored::Colorize;
use std::path::PathBuf;

/// Absolute paths for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub install_base: PathBuf,
    pub profile: PathBuf,
    pub applications_dir: PathBuf,
    /// `None` means the built-in framework table.
    pub frameworks_file: Option<PathBuf>,
}

/// Applies defaults and `~`/`$VAR` expansion to the user supplied paths.
///
/// Defaults:
/// * install base: `<data_dir>/devmake` (`~/.local/share/devmake` on Linux)
/// * profile: `~/.profile`
/// * applications dir: `<data_dir>/applications`
pub fn resolve_paths(
    install_base: Option<&str>,
    profile: Option<&str>,
    applications_dir: Option<&str>,
    frameworks_file: Option<&str>,
) -> Result<ResolvedPaths, InstallError> {
    let data_dir = || {
        dirs::data_dir().ok_or_else(|| {
            InstallError::Config("cannot determine the user data directory".to_string())
        })
    };

    let install_base = match install_base {
        Some(p) => expand_path(p),
        None => data_dir()?.join("devmake"),
    };
    let profile = match profile {
        Some(p) => expand_path(p),
        None => dirs::home_dir()
            .ok_or_else(|| InstallError::Config("cannot determine the home directory".to_string()))?
            .join(".profile"),
    };
    let applications_dir = match applications_dir {
        Some(p) => expand_path(p),
        None => data_dir()?.join("applications"),
    };
    let frameworks_file = frameworks_file.map(expand_path);

    let resolved = ResolvedPaths {
        install_base,
        profile,
        applications_dir,
        frameworks_file,
    };
    for (what, path) in [
        ("install base", &resolved.install_base),
        ("profile", &resolved.profile),
        ("applications dir", &resolved.applications_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(InstallError::Config(format!("the {what} path is empty")));
        }
        log_debug!("[Paths] {}: {}", what, path.display().to_string().cyan());
    }
    Ok(resolved)
}
