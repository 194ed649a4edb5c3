// The installation pipeline.
//
// One framework is installed by walking a fixed sequence of states:
//
//   CheckInstalled → AskPath → Download → Verify → Extract → PostInstall → RegisterLauncher → Done
//
// Any failure moves to `Error(kind)` and stops; there are no retries. Questions for the
// user are emitted through an `InteractionChannel` and answered by whatever driver the
// caller plugged in (the terminal in production, a script in tests). Every visited
// state is kept in `history` so callers and tests can see how far a run got.

use crate::libs::interactions::{
    Answer, Choice, Interaction, InteractionChannel, InteractionDriver,
};
use crate::libs::launcher::{Launcher, LauncherRecord};
use crate::libs::link_resolver::{LinkResolver, absolutize};
use crate::libs::post_install::{self, HookContext};
use crate::libs::utilities::assets::{
    Checksum, DownloadTask, DownloadedArchive, Fetcher, archive_name_from_url,
};
use crate::libs::utilities::compression::{self, OverwritePolicy};
use crate::libs::utilities::deadline::Deadline;
use crate::libs::utilities::path_helpers::{expand_path, is_populated};
use crate::schemas::errors::InstallError;
use crate::schemas::framework::{DownloadSource, FrameworkDescriptor};
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// States of one installation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    CheckInstalled,
    AskPath,
    Download,
    Verify,
    Extract,
    PostInstall,
    RegisterLauncher,
    Done,
    /// Absorbing failure state, carrying the error kind (`ChecksumError`, ...).
    Error(String),
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::Error(kind) => write!(f, "Error({kind})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Machine and user settings an installation runs with.
#[derive(Debug, Clone)]
pub struct InstallSettings {
    /// Root of all installs: `<install_base>/<category>/<id>[-variant]`.
    pub install_base: PathBuf,
    /// Install path given on the command line. Skips the path question.
    pub path_override: Option<PathBuf>,
    /// Profile file receiving environment blocks.
    pub profile: PathBuf,
    /// Where desktop entries and icons go.
    pub applications_dir: PathBuf,
    /// Canonical architecture (`amd64`, `arm64`, ...).
    pub arch: String,
    /// Pre-accept license questions.
    pub accept_license: bool,
    /// Bound on each long operation (page fetch, download, extraction).
    pub operation_timeout: Duration,
    /// Bound on waiting for each answer.
    pub answer_timeout: Duration,
}

impl InstallSettings {
    pub fn bin_dir(&self) -> PathBuf {
        self.install_base.join("bin")
    }

    /// Downloads land here under a temp name, then get renamed once verified.
    pub fn downloads_dir(&self) -> PathBuf {
        self.install_base.join(".downloads")
    }

    pub fn launcher(&self) -> Launcher {
        Launcher::new(self.bin_dir(), self.applications_dir.clone())
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed {
        install_path: PathBuf,
        /// The main executable inside `install_path`, when the framework declares one.
        exec_path: Option<PathBuf>,
        launcher: LauncherRecord,
    },
    /// The framework was already installed and the user chose to keep it.
    Cancelled,
}

/// One installation of one framework.
pub struct Installation<'a> {
    framework: &'a FrameworkDescriptor,
    settings: &'a InstallSettings,
    fetcher: &'a Fetcher,
    channel: InteractionChannel,
    history: Vec<InstallState>,
}

/// Values carried from one state to the next.
struct RunContext {
    arch_token: String,
    install_path: PathBuf,
    policy: OverwritePolicy,
    checksum: Option<Checksum>,
}

impl<'a> Installation<'a> {
    pub fn new(
        framework: &'a FrameworkDescriptor,
        settings: &'a InstallSettings,
        fetcher: &'a Fetcher,
    ) -> Self {
        Installation {
            framework,
            settings,
            fetcher,
            channel: InteractionChannel::new(),
            history: Vec::new(),
        }
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[InstallState] {
        &self.history
    }

    #[cfg(test)]
    pub fn channel(&self) -> &InteractionChannel {
        &self.channel
    }

    /// Runs the whole pipeline. On failure the history ends with `Error(kind)`.
    pub fn run(
        &mut self,
        driver: &mut dyn InteractionDriver,
    ) -> Result<InstallOutcome, InstallError> {
        log_info!("[Installer] Installing {}", self.framework.name.bold());
        match self.drive(driver) {
            Ok(outcome) => {
                self.enter(InstallState::Done);
                self.channel.finish(true);
                Ok(outcome)
            }
            Err(err) => {
                // Reported once, by the caller.
                log_debug!("[Installer] Stopped with {}", err.kind().red());
                self.enter(InstallState::Error(err.kind().to_string()));
                self.channel.finish(false);
                Err(err)
            }
        }
    }

    fn enter(&mut self, state: InstallState) {
        log_debug!("[Installer] -> {}", state.to_string().magenta());
        self.history.push(state);
    }

    fn drive(
        &mut self,
        driver: &mut dyn InteractionDriver,
    ) -> Result<InstallOutcome, InstallError> {
        self.enter(InstallState::CheckInstalled);
        let Some(mut ctx) = self.check_installed(driver)? else {
            log_info!("[Installer] Keeping the existing {} installation", self.framework.name);
            return Ok(InstallOutcome::Cancelled);
        };

        self.enter(InstallState::AskPath);
        self.ask_path(&mut ctx, driver)?;

        self.enter(InstallState::Download);
        let (task, downloaded) = self.download(&ctx)?;

        self.enter(InstallState::Verify);
        let archive = Self::verify(&task, downloaded)?;

        self.enter(InstallState::Extract);
        let extracted = self.extract(&ctx, &archive);
        // The archive is only needed for extraction, whatever its outcome.
        if let Err(e) = fs::remove_file(&archive) {
            log_warn!("[Installer] Could not remove {}: {}", archive.display(), e);
        }
        extracted?;

        self.enter(InstallState::PostInstall);
        let notices = post_install::run_hooks(
            &HookContext {
                framework: self.framework,
                install_path: &ctx.install_path,
                arch_token: &ctx.arch_token,
                profile: &self.settings.profile,
                accept_license: self.settings.accept_license,
                answer_timeout: self.settings.answer_timeout,
            },
            &mut self.channel,
            driver,
        )?;

        self.enter(InstallState::RegisterLauncher);
        let launcher = self
            .settings
            .launcher()
            .register(self.framework, &ctx.install_path)?;

        self.say(driver, "Installation done")?;
        for notice in notices {
            self.say(driver, &notice)?;
        }
        let exec_path = self
            .framework
            .main_executable()
            .map(|exe| ctx.install_path.join(exe));
        Ok(InstallOutcome::Installed {
            install_path: ctx.install_path,
            exec_path,
            launcher,
        })
    }

    fn say(&mut self, driver: &mut dyn InteractionDriver, text: &str) -> Result<(), InstallError> {
        self.channel
            .converse(Interaction::message(text), driver, self.settings.answer_timeout)?;
        Ok(())
    }

    /// Validates the architecture and asks what to do with an existing installation.
    ///
    /// # Returns
    /// * `Ok(Some(ctx))` to go on, with the overwrite policy the answer implies.
    /// * `Ok(None)` when the user chose to keep the existing installation.
    /// * `Err(InstallError::Config)` for an unsupported or unmapped architecture or a
    ///   malformed checksum. Nothing has been asked or downloaded at that point.
    fn check_installed(
        &mut self,
        driver: &mut dyn InteractionDriver,
    ) -> Result<Option<RunContext>, InstallError> {
        // Pre-flight: everything that can be rejected without the network.
        let arch_token = self.framework.arch_token(&self.settings.arch)?;
        let checksum = self
            .framework
            .checksum
            .as_deref()
            .map(str::parse::<Checksum>)
            .transpose()?;
        let install_path = match &self.settings.path_override {
            Some(p) => p.clone(),
            None => self.framework.default_install_path(&self.settings.install_base),
        };

        // Fresh installs never overwrite; only an explicit reinstall does.
        let mut policy = OverwritePolicy::Refuse;
        if is_populated(&install_path) {
            let question = Interaction::InputQuestion {
                question: format!(
                    "{} is already installed on {}",
                    self.framework.name,
                    install_path.display()
                ),
                choices: vec![
                    Choice::new("reinstall", "Reinstall", 'r'),
                    Choice::new("cancel", "Cancel", 'c'),
                ],
                default: Some(1),
            };
            match self
                .channel
                .converse(question, driver, self.settings.answer_timeout)?
            {
                Answer::Choice(id) if id == "reinstall" => policy = OverwritePolicy::Replace,
                _ => return Ok(None),
            }
        }

        Ok(Some(RunContext {
            arch_token,
            install_path,
            policy,
            checksum,
        }))
    }

    /// Asks for the install path unless one was given on the command line.
    /// Choosing another path than the proposed one drops a pending reinstall.
    fn ask_path(
        &mut self,
        ctx: &mut RunContext,
        driver: &mut dyn InteractionDriver,
    ) -> Result<(), InstallError> {
        if self.settings.path_override.is_some() {
            log_debug!("[Installer] Install path given on the command line");
            return Ok(());
        }
        let question = Interaction::TextQuestion {
            question: "Choose installation path".to_string(),
            default: Some(ctx.install_path.display().to_string()),
        };
        let Answer::Text(raw) = self
            .channel
            .converse(question, driver, self.settings.answer_timeout)?
        else {
            return Ok(());
        };

        // `~` and `$VARS` are expanded, relative answers are taken from the cwd.
        let mut chosen = expand_path(&raw);
        if chosen.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| InstallError::io(".", e))?;
            chosen = cwd.join(chosen);
        }
        if chosen != ctx.install_path {
            // Replacing only ever applies to the installation the user was asked about.
            ctx.policy = OverwritePolicy::Refuse;
            ctx.install_path = chosen;
        }
        log_info!(
            "[Installer] Installing into {}",
            ctx.install_path.display().to_string().cyan()
        );
        Ok(())
    }

    /// Resolves the archive URL and streams it into a temp file.
    ///
    /// # Arguments
    /// * `ctx`: carries the architecture token the page link must match and the
    ///   expected checksum.
    ///
    /// # Returns
    /// * The [`DownloadTask`] describing where the archive goes once verified, together
    ///   with the unverified download.
    /// * `Err(InstallError::Network)` when the page has no link for this architecture.
    fn download(
        &self,
        ctx: &RunContext,
    ) -> Result<(DownloadTask, DownloadedArchive), InstallError> {
        // Pages are scanned for the first line that fits this machine.
        let url = match &self.framework.source {
            DownloadSource::Direct(url) => url.clone(),
            DownloadSource::Page { url, link_pattern } => {
                let resolver = LinkResolver::new(link_pattern, &ctx.arch_token);
                let page = self.fetcher.fetch_page(url)?;
                let link = resolver.scan_page(&page).ok_or_else(|| {
                    InstallError::Network(format!(
                        "no compatible download found for {} ('{}' on {})",
                        self.framework.name,
                        resolver.needle(),
                        url
                    ))
                })?;
                absolutize(url, &link)?
            }
        };
        let task = DownloadTask {
            dest: self
                .settings
                .downloads_dir()
                .join(archive_name_from_url(&url)),
            url,
            checksum: ctx.checksum.clone(),
        };

        // Progress is logged in steps of ten percent when the size is announced.
        let mut last_tenth = 0;
        let mut progress = |done: u64, total: Option<u64>| {
            if let Some(total) = total.filter(|t| *t > 0) {
                let tenth = done * 10 / total;
                if tenth > last_tenth {
                    last_tenth = tenth;
                    log_debug!("[Installer] Downloaded {}%", tenth * 10);
                }
            }
        };
        let downloaded = self.fetcher.fetch(&task, Some(&mut progress))?;
        log_info!(
            "[Installer] Downloaded {} ({} bytes)",
            archive_name_from_url(&downloaded.url).cyan(),
            downloaded.bytes
        );
        Ok((task, downloaded))
    }

    /// Checks the digest and moves the archive to `task.dest`. On mismatch the
    /// temp file is dropped here and nothing reaches `task.dest`.
    fn verify(task: &DownloadTask, downloaded: DownloadedArchive) -> Result<PathBuf, InstallError> {
        downloaded.verify(task.checksum.as_ref())?;
        downloaded.persist(&task.dest)
    }

    fn extract(&self, ctx: &RunContext, archive: &Path) -> Result<(), InstallError> {
        let deadline = Deadline::start(
            format!("extracting {}", self.framework.name),
            self.settings.operation_timeout,
        );
        compression::extract(
            archive,
            &ctx.install_path,
            self.framework.strip_pattern.as_deref(),
            ctx.policy,
            &deadline,
        )?;
        compression::mark_executables(&ctx.install_path, &self.framework.executables)?;
        Ok(())
    }
}
