use clap::Parser;

/// Defines the command-line interface (CLI) for 'devmake'.
///
/// Installing is the default action: `devmake <category> [framework] [path]`.
/// `--remove` and `--list` switch to the other two actions.
#[derive(Parser, Debug)]
#[command(name = "devmake", version)]
#[command(about = "Download, verify and install developer tools", long_about = None)]
pub struct Cli {
    /// Enables detailed debug output for troubleshooting and development.
    #[arg(short, long)]
    pub(crate) debug: bool,

    /// Category of the tool (e.g. `ide`, `rust`, `go`).
    #[arg(required_unless_present = "list")]
    pub(crate) category: Option<String>,

    /// Framework inside the category (e.g. `idea`). Defaults to the category default.
    pub(crate) framework: Option<String>,

    /// Installation path. Skips the path question.
    pub(crate) path: Option<String>,

    /// Variant of the framework (e.g. `eap`).
    #[arg(long)]
    pub(crate) variant: Option<String>,

    /// Remove the framework instead of installing it.
    #[arg(short, long, conflicts_with = "list")]
    pub(crate) remove: bool,

    /// Accept license questions without asking.
    #[arg(long)]
    pub(crate) accept_license: bool,

    /// List every category and framework, marking installed ones.
    #[arg(short, long)]
    pub(crate) list: bool,

    /// Framework table to use instead of the built-in one.
    #[arg(long, env = "DEVMAKE_FRAMEWORKS")]
    pub(crate) frameworks: Option<String>,

    /// Root directory of all installations (defaults to ~/.local/share/devmake).
    #[arg(long, env = "DEVMAKE_INSTALL_BASE")]
    pub(crate) install_base: Option<String>,

    /// Profile file receiving environment variables (defaults to ~/.profile).
    #[arg(long, env = "DEVMAKE_PROFILE")]
    pub(crate) profile: Option<String>,

    /// Directory for desktop entries (defaults to ~/.local/share/applications).
    #[arg(long, env = "DEVMAKE_APPLICATIONS_DIR")]
    pub(crate) applications_dir: Option<String>,

    /// Limit in seconds for each page fetch, download and extraction.
    #[arg(long, env = "DEVMAKE_TIMEOUT", default_value_t = 600)]
    pub(crate) timeout: u64,

    /// Limit in seconds for answering each question.
    #[arg(long, env = "DEVMAKE_ANSWER_TIMEOUT", default_value_t = 3600)]
    pub(crate) answer_timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_with_variant_and_path() {
        let cli = Cli::try_parse_from([
            "devmake", "ide", "idea", "/opt/idea", "--variant", "eap", "--accept-license",
        ])
        .unwrap();
        assert_eq!(cli.category.as_deref(), Some("ide"));
        assert_eq!(cli.framework.as_deref(), Some("idea"));
        assert_eq!(cli.path.as_deref(), Some("/opt/idea"));
        assert_eq!(cli.variant.as_deref(), Some("eap"));
        assert!(cli.accept_license);
        assert!(!cli.remove);
    }

    #[test]
    fn category_is_required_unless_listing() {
        assert!(Cli::try_parse_from(["devmake"]).is_err());
        assert!(Cli::try_parse_from(["devmake", "--list"]).unwrap().list);
        assert!(Cli::try_parse_from(["devmake", "--list", "--remove", "go"]).is_err());
    }
}
