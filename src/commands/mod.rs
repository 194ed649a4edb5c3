// Register application actions.
// Each module corresponds to one `devmake` command-line action.

use crate::cli::cmd_enums::Cli;
use crate::libs::installation::InstallSettings;
use crate::libs::paths::{ResolvedPaths, resolve_paths};
use crate::libs::utilities::path_helpers::expand_path;
use crate::libs::utilities::platform::detect_architecture;
use crate::schemas::framework::{FrameworkDescriptor, FrameworkRegistry};
use anyhow::Context;
use std::time::Duration;

// Downloads and installs one framework (the default action).
pub mod install;
// Prints every known framework (--list).
pub mod list;
// Removes an installed framework (--remove).
pub mod remove;

/// Resolves paths and loads the framework table for this invocation.
pub(crate) fn load(cli: &Cli) -> anyhow::Result<(ResolvedPaths, FrameworkRegistry)> {
    let paths = resolve_paths(
        cli.install_base.as_deref(),
        cli.profile.as_deref(),
        cli.applications_dir.as_deref(),
        cli.frameworks.as_deref(),
    )?;
    let registry = FrameworkRegistry::load(paths.frameworks_file.as_deref())
        .context("failed to load the framework table")?;
    Ok((paths, registry))
}

/// Finds the framework named on the command line.
///
/// `devmake rust ~/rust` has no framework id: a second positional that is not a known
/// framework but looks like a path is taken as the path.
pub(crate) fn select_framework(
    cli: &Cli,
    registry: &FrameworkRegistry,
) -> anyhow::Result<(FrameworkDescriptor, Option<String>)> {
    let category = cli
        .category
        .as_deref()
        .context("a category is required (see --list)")?;
    let (framework, path) = match (cli.framework.as_deref(), cli.path.as_deref()) {
        (Some(candidate), None)
            if !registry.contains(category, candidate) && looks_like_path(candidate) =>
        {
            (None, Some(candidate))
        }
        other => other,
    };
    let descriptor = registry.find(category, framework, cli.variant.as_deref())?;
    Ok((descriptor, path.map(str::to_string)))
}

fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || arg.starts_with('~') || arg.starts_with('.') || arg.starts_with('$')
}

/// Settings for one installation or removal.
pub(crate) fn settings(cli: &Cli, paths: &ResolvedPaths, path: Option<&str>) -> InstallSettings {
    InstallSettings {
        install_base: paths.install_base.clone(),
        path_override: path.map(expand_path),
        profile: paths.profile.clone(),
        applications_dir: paths.applications_dir.clone(),
        arch: detect_architecture(),
        accept_license: cli.accept_license,
        operation_timeout: Duration::from_secs(cli.timeout),
        answer_timeout: Duration::from_secs(cli.answer_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[rstest]
    #[case(&["devmake", "rust"], "rust-lang", None)]
    #[case(&["devmake", "rust", "rust-lang"], "rust-lang", None)]
    #[case(&["devmake", "rust", "~/tools/rust"], "rust-lang", Some("~/tools/rust"))]
    #[case(&["devmake", "rust", "rust-lang", "/opt/rust"], "rust-lang", Some("/opt/rust"))]
    fn framework_and_path_from_positionals(
        #[case] args: &[&str],
        #[case] id: &str,
        #[case] path: Option<&str>,
    ) {
        let cli = Cli::try_parse_from(args).unwrap();
        let registry = FrameworkRegistry::load(None).unwrap();
        let (descriptor, got_path) = select_framework(&cli, &registry).unwrap();
        assert_eq!(descriptor.id, id);
        assert_eq!(got_path.as_deref(), path);
    }

    #[test]
    fn unknown_framework_name_is_not_a_path() {
        let cli = Cli::try_parse_from(["devmake", "rust", "rusty"]).unwrap();
        let registry = FrameworkRegistry::load(None).unwrap();
        let err = select_framework(&cli, &registry).unwrap_err();
        assert!(err.to_string().contains("unknown framework 'rusty'"));
    }
}
