// Post-install hooks.
//
// Tools differ in what they need after extraction: language toolchains want their `bin`
// directories on PATH, Rust wants its std-lib linked next to `rustc`, some IDEs ship a
// license the user has to accept. Each of these is a `PostInstallHook` variant from the
// framework table; this module executes them in order.
//
// Environment variables are registered as a marked block in the user's profile file:
//
//   # >>> devmake: Rust Lang >>>
//   export PATH="/home/me/.local/share/devmake/rust/rust-lang/rustc/bin:$PATH"
//   # <<< devmake: Rust Lang <<<
//
// Reinstalling replaces the block; removing a framework deletes it.

use crate::libs::interactions::{Answer, Interaction, InteractionChannel, InteractionDriver};
use crate::libs::utilities::path_helpers::list_top_level;
use crate::schemas::errors::InstallError;
use crate::schemas::framework::{FrameworkDescriptor, PostInstallHook};
use crate::{log_debug, log_info};
use colored::Colorize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shown once environment variables were written; they only apply to new sessions.
pub const RELOGIN_REQUIRED: &str =
    "You need to restart your current shell session for your {name} installation to work properly";

/// Everything a hook may need to know about the installation it runs for.
pub struct HookContext<'a> {
    pub framework: &'a FrameworkDescriptor,
    pub install_path: &'a Path,
    /// Upstream architecture token (`x86_64`, not `amd64`).
    pub arch_token: &'a str,
    /// Profile file receiving environment blocks.
    pub profile: &'a Path,
    /// Answer license questions with "accept" without asking.
    pub accept_license: bool,
    /// How long to wait for each answer.
    pub answer_timeout: Duration,
}

/// Runs every hook of the framework in table order. Returns messages to show the user
/// once the installation is complete.
pub fn run_hooks(
    ctx: &HookContext<'_>,
    channel: &mut InteractionChannel,
    driver: &mut dyn InteractionDriver,
) -> Result<Vec<String>, InstallError> {
    let mut notices = Vec::new();
    for hook in &ctx.framework.post_install {
        log_debug!("[PostInstall] Running hook {:?}", hook);
        match hook {
            PostInstallHook::Env { vars } => {
                let expanded: BTreeMap<String, String> = vars
                    .iter()
                    .map(|(k, v)| (k.clone(), expand_template(v, ctx.install_path, ctx.arch_token)))
                    .collect();
                register_env(ctx.profile, &ctx.framework.name, &expanded)?;
                notices.push(RELOGIN_REQUIRED.replace("{name}", &ctx.framework.name));
            }
            PostInstallHook::SymlinkFarm { from, to } => {
                let from = ctx
                    .install_path
                    .join(expand_template(from, ctx.install_path, ctx.arch_token));
                let to = ctx
                    .install_path
                    .join(expand_template(to, ctx.install_path, ctx.arch_token));
                symlink_farm(ctx.install_path, &from, &to)?;
            }
            PostInstallHook::License { text, accept_token } => {
                ask_license(ctx, text, accept_token, channel, driver)?;
            }
            PostInstallHook::Message { text } => {
                let text = expand_template(text, ctx.install_path, ctx.arch_token);
                channel.converse(Interaction::message(text), driver, ctx.answer_timeout)?;
            }
        }
    }
    Ok(notices)
}

/// Substitutes `{install_path}` and `{arch}`. Shell variables such as `$HOME` are kept
/// for the shell to expand.
pub fn expand_template(template: &str, install_path: &Path, arch_token: &str) -> String {
    template
        .replace("{install_path}", &install_path.to_string_lossy())
        .replace("{arch}", arch_token)
}

fn ask_license(
    ctx: &HookContext<'_>,
    text: &str,
    accept_token: &str,
    channel: &mut InteractionChannel,
    driver: &mut dyn InteractionDriver,
) -> Result<(), InstallError> {
    if ctx.accept_license {
        log_info!(
            "[PostInstall] License of {} accepted from the command line",
            ctx.framework.name.bold()
        );
        return Ok(());
    }
    let question = Interaction::LicenseQuestion {
        framework: ctx.framework.name.clone(),
        text: text.to_string(),
        accept_token: accept_token.to_string(),
    };
    match channel.converse(question, driver, ctx.answer_timeout)? {
        Answer::License { accepted: true } => Ok(()),
        _ => Err(InstallError::LicenseDeclined(ctx.framework.name.clone())),
    }
}

// ============================================================================
// ENVIRONMENT REGISTRATION
// ============================================================================

fn block_markers(name: &str) -> (String, String) {
    (
        format!("# >>> devmake: {name} >>>"),
        format!("# <<< devmake: {name} <<<"),
    )
}

/// Renders `export` lines. `PATH` entries are prepended to the existing PATH.
fn render_exports(vars: &BTreeMap<String, String>) -> Vec<String> {
    vars.iter()
        .map(|(name, value)| {
            if name == "PATH" {
                format!("export PATH=\"{value}:$PATH\"")
            } else {
                format!("export {name}=\"{value}\"")
            }
        })
        .collect()
}

/// Writes (or rewrites) the environment block of `name` in `profile`.
pub fn register_env(
    profile: &Path,
    name: &str,
    vars: &BTreeMap<String, String>,
) -> Result<(), InstallError> {
    let (start, end) = block_markers(name);
    let mut lines = read_profile(profile)?;
    strip_block(&mut lines, &start, &end);

    lines.push(start);
    lines.push(format!(
        "# added on {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    ));
    lines.extend(render_exports(vars));
    lines.push(end);

    write_profile(profile, &lines)?;
    log_info!(
        "[PostInstall] Registered {} in {}",
        vars.keys().cloned().collect::<Vec<_>>().join(", ").green(),
        profile.display().to_string().cyan()
    );
    Ok(())
}

/// Removes the environment block of `name`. Returns whether one was found.
pub fn unregister_env(profile: &Path, name: &str) -> Result<bool, InstallError> {
    if !profile.exists() {
        return Ok(false);
    }
    let (start, end) = block_markers(name);
    let mut lines = read_profile(profile)?;
    let before = lines.len();
    strip_block(&mut lines, &start, &end);
    if lines.len() == before {
        return Ok(false);
    }
    write_profile(profile, &lines)?;
    Ok(true)
}

fn read_profile(profile: &Path) -> Result<Vec<String>, InstallError> {
    if !profile.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(profile).map_err(|e| InstallError::io(profile, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

fn write_profile(profile: &Path, lines: &[String]) -> Result<(), InstallError> {
    if let Some(parent) = profile.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(profile, content).map_err(|e| InstallError::io(profile, e))
}

/// Drops every line from `start` to `end` inclusive. An unterminated block runs to the end.
fn strip_block(lines: &mut Vec<String>, start: &str, end: &str) {
    let mut inside = false;
    lines.retain(|line| {
        let trimmed = line.trim();
        if trimmed == start {
            inside = true;
            return false;
        }
        if inside {
            if trimmed == end {
                inside = false;
            }
            return false;
        }
        true
    });
}

// ============================================================================
// SYMLINK FARM
// ============================================================================

/// Links every entry of `from` into `to`, creating `to` if needed.
fn symlink_farm(install_path: &Path, from: &Path, to: &Path) -> Result<Vec<PathBuf>, InstallError> {
    if !from.is_dir() {
        return Err(InstallError::Layout {
            dir: install_path.to_path_buf(),
            expected: from
                .strip_prefix(install_path)
                .unwrap_or(from)
                .display()
                .to_string(),
            found: list_top_level(install_path),
        });
    }
    fs::create_dir_all(to).map_err(|e| InstallError::io(to, e))?;

    let mut linked = Vec::new();
    for name in list_top_level(from) {
        let target = from.join(&name);
        let link = to.join(&name);
        if link.symlink_metadata().is_ok() {
            log_debug!("[PostInstall] {} already exists, leaving it", link.display());
            continue;
        }
        make_symlink(&target, &link)?;
        linked.push(link);
    }
    log_debug!(
        "[PostInstall] Linked {} entries from {} into {}",
        linked.len(),
        from.display(),
        to.display()
    );
    Ok(linked)
}

#[cfg(unix)]
pub(crate) fn make_symlink(target: &Path, link: &Path) -> Result<(), InstallError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| InstallError::io(link, e))
}

#[cfg(not(unix))]
pub(crate) fn make_symlink(_target: &Path, link: &Path) -> Result<(), InstallError> {
    Err(InstallError::Config(format!(
        "cannot create {}: symlinks are only supported on Unix systems",
        link.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::interactions::ScriptedDriver;
    use crate::schemas::framework::FrameworkRegistry;

    fn rust_framework() -> FrameworkDescriptor {
        FrameworkRegistry::load(None)
            .unwrap()
            .find("rust", None, None)
            .unwrap()
    }

    #[test]
    fn env_block_is_replaced_not_duplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = tmp.path().join(".profile");
        fs::write(&profile, "export EDITOR=vim\n").unwrap();

        let mut vars = BTreeMap::new();
        vars.insert("PATH".to_string(), "/opt/rust/bin:$HOME/.cargo/bin".to_string());
        register_env(&profile, "Rust Lang", &vars).unwrap();
        register_env(&profile, "Rust Lang", &vars).unwrap();

        let content = fs::read_to_string(&profile).unwrap();
        assert!(content.starts_with("export EDITOR=vim\n"));
        assert_eq!(content.matches("# >>> devmake: Rust Lang >>>").count(), 1);
        assert!(content.contains("export PATH=\"/opt/rust/bin:$HOME/.cargo/bin:$PATH\""));

        assert!(unregister_env(&profile, "Rust Lang").unwrap());
        assert_eq!(fs::read_to_string(&profile).unwrap(), "export EDITOR=vim\n");
        assert!(!unregister_env(&profile, "Rust Lang").unwrap());
    }

    #[test]
    fn rust_hooks_register_path_and_link_std() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path().join("rust-lang");
        let std_lib = install.join("rust-std-x86_64-unknown-linux-gnu/lib/rustlib/x86_64-unknown-linux-gnu/lib");
        fs::create_dir_all(&std_lib).unwrap();
        fs::write(std_lib.join("libstd.rlib"), "").unwrap();
        fs::write(std_lib.join("libcore.rlib"), "").unwrap();
        fs::create_dir_all(install.join("rustc/lib/rustlib")).unwrap();
        let profile = tmp.path().join(".profile");

        let framework = rust_framework();
        let ctx = HookContext {
            framework: &framework,
            install_path: &install,
            arch_token: "x86_64",
            profile: &profile,
            accept_license: false,
            answer_timeout: Duration::from_secs(5),
        };
        let mut channel = InteractionChannel::new();
        let mut driver = ScriptedDriver::new(&[]);
        let notices = run_hooks(&ctx, &mut channel, &mut driver).unwrap();

        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("Rust Lang"));
        let profile_content = fs::read_to_string(&profile).unwrap();
        assert!(profile_content.contains(&format!(
            "{}/rustc/bin:{}/cargo/bin:$HOME/.cargo/bin:$PATH",
            install.display(),
            install.display()
        )));
        let linked = install.join("rustc/lib/rustlib/x86_64-unknown-linux-gnu/lib");
        assert_eq!(list_top_level(&linked), vec!["libcore.rlib", "libstd.rlib"]);
        #[cfg(unix)]
        assert!(linked.join("libstd.rlib").symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn missing_farm_source_is_a_layout_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = symlink_farm(tmp.path(), &tmp.path().join("nope"), &tmp.path().join("to"))
            .unwrap_err();
        assert_eq!(err.kind(), "LayoutError");
    }

    fn license_framework() -> FrameworkDescriptor {
        let mut framework = rust_framework();
        framework.post_install = vec![PostInstallHook::License {
            text: "EPL 2.0".to_string(),
            accept_token: "a".to_string(),
        }];
        framework
    }

    fn run_license(answers: &[&str], accept_license: bool) -> Result<Vec<String>, InstallError> {
        let tmp = tempfile::tempdir().unwrap();
        let framework = license_framework();
        let ctx = HookContext {
            framework: &framework,
            install_path: tmp.path(),
            arch_token: "x86_64",
            profile: &tmp.path().join(".profile"),
            accept_license,
            answer_timeout: Duration::from_secs(5),
        };
        let mut driver = ScriptedDriver::new(answers);
        run_hooks(&ctx, &mut InteractionChannel::new(), &mut driver)
    }

    #[test]
    fn license_must_be_accepted() {
        assert!(run_license(&["a"], false).is_ok());
        assert!(run_license(&["what", "a"], false).is_ok());
        assert_eq!(run_license(&["n"], false).unwrap_err().kind(), "LicenseDeclined");
        // Pre-accepted: no question asked, so an empty script is fine.
        assert!(run_license(&[], true).is_ok());
    }
}
