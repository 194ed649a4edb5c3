// `--remove`: undo one installation.
//
// Deletes the install directory, then the launcher artifacts and the environment block
// written by the env hook. Artifacts that are already gone are skipped.

use crate::cli::cmd_enums::Cli;
use crate::libs::post_install::unregister_env;
use crate::{log_debug, log_info};
use anyhow::{Context, bail};
use colored::Colorize;
use std::fs;

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let (paths, registry) = super::load(cli)?;
    let (framework, path) = super::select_framework(cli, &registry)?;
    let settings = super::settings(cli, &paths, path.as_deref());

    let install_path = settings
        .path_override
        .clone()
        .unwrap_or_else(|| framework.default_install_path(&settings.install_base));
    if !install_path.exists() {
        bail!(
            "{} is not installed in {}",
            framework.name,
            install_path.display()
        );
    }

    log_info!(
        "[Remove] Removing {} from {}",
        framework.name.bold(),
        install_path.display().to_string().cyan()
    );
    fs::remove_dir_all(&install_path)
        .with_context(|| format!("failed to remove {}", install_path.display()))?;

    let launchers = settings.launcher().unregister(&framework)?;
    log_debug!("[Remove] Removed {} launcher artifacts", launchers);
    if unregister_env(&settings.profile, &framework.name)? {
        log_info!(
            "[Remove] Removed environment variables from {}",
            settings.profile.display()
        );
    }
    log_info!("[Remove] {} removed", framework.name.green());
    Ok(())
}
