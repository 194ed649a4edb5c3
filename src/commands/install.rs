// Default action: install one framework.
//
// Wires the command line to an `Installation` driven by the terminal: prompts go to
// stdout, answers come from stdin, logs go to stderr.

use crate::cli::cmd_enums::Cli;
use crate::libs::installation::{InstallOutcome, Installation};
use crate::libs::interactions::TerminalDriver;
use crate::libs::utilities::assets::Fetcher;
use crate::{log_debug, log_info};
use colored::Colorize;

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let (paths, registry) = super::load(cli)?;
    let (framework, path) = super::select_framework(cli, &registry)?;
    let settings = super::settings(cli, &paths, path.as_deref());

    log_debug!(
        "[Installer] {} ({}) on {}, hooks: {}",
        framework,
        framework.description,
        settings.arch,
        serde_json::to_string(&framework.post_install).unwrap_or_default()
    );

    let fetcher = Fetcher::new(settings.operation_timeout);
    let mut driver = TerminalDriver::new();
    let mut installation = Installation::new(&framework, &settings, &fetcher);
    let result = installation.run(&mut driver);
    log_debug!(
        "[Installer] States: {}",
        installation
            .history()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    // The error kind leads the message so scripts can grep for it.
    let outcome = result.map_err(|err| {
        let kind = err.kind();
        anyhow::Error::new(err)
            .context(format!("installing {} failed with {}", framework.name, kind))
    })?;
    match outcome {
        InstallOutcome::Installed { install_path, .. } => log_info!(
            "[Installer] {} installed in {}",
            framework.name.green(),
            install_path.display().to_string().cyan()
        ),
        InstallOutcome::Cancelled => {
            log_info!("[Installer] Nothing to do for {}", framework.name)
        }
    }
    Ok(())
}
