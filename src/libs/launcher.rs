// Launcher registration: what makes an installed tool startable.
//
// Three artifacts, all derived from the descriptor:
// - an executable symlink `<install_base>/bin/<id>[-variant]` pointing at the main executable,
// - a freedesktop `.desktop` entry in the applications directory (GUI tools only),
// - a copy of the tool's icon next to the desktop entry.

use crate::libs::post_install::make_symlink;
use crate::schemas::errors::InstallError;
use crate::schemas::framework::FrameworkDescriptor;
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Where launcher artifacts go.
#[derive(Debug, Clone)]
pub struct Launcher {
    /// Directory holding exec symlinks.
    pub bin_dir: PathBuf,
    /// Directory holding `.desktop` files and their icons.
    pub applications_dir: PathBuf,
}

/// What `register` created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LauncherRecord {
    pub exec_link: Option<PathBuf>,
    pub desktop_file: Option<PathBuf>,
    pub icon: Option<PathBuf>,
}

impl Launcher {
    pub fn new(bin_dir: PathBuf, applications_dir: PathBuf) -> Self {
        Launcher {
            bin_dir,
            applications_dir,
        }
    }

    pub fn exec_link_path(&self, framework: &FrameworkDescriptor) -> PathBuf {
        self.bin_dir.join(framework.dir_name())
    }

    pub fn desktop_file_path(&self, framework: &FrameworkDescriptor) -> Option<PathBuf> {
        framework
            .desktop_file_name()
            .map(|name| self.applications_dir.join(name))
    }

    /// Icon destination: the desktop file stem plus the icon's own extension.
    fn icon_path(&self, framework: &FrameworkDescriptor, icon_source: &Path) -> Option<PathBuf> {
        let desktop = framework.desktop_file_name()?;
        let stem = desktop.trim_end_matches(".desktop");
        let name = match icon_source.extension() {
            Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
            None => stem.to_string(),
        };
        Some(self.applications_dir.join(name))
    }

    /// Creates the exec link, desktop entry and icon for a freshly installed framework.
    /// Existing artifacts of the same framework are replaced.
    pub fn register(
        &self,
        framework: &FrameworkDescriptor,
        install_path: &Path,
    ) -> Result<LauncherRecord, InstallError> {
        let mut record = LauncherRecord::default();
        let Some(main) = framework.main_executable() else {
            log_debug!("[Launcher] {} declares no executable, nothing to register", framework);
            return Ok(record);
        };
        let exec_target = install_path.join(main);

        // Exec link
        let link = self.exec_link_path(framework);
        fs::create_dir_all(&self.bin_dir).map_err(|e| InstallError::io(&self.bin_dir, e))?;
        remove_if_present(&link)?;
        make_symlink(&exec_target, &link)?;
        log_info!(
            "[Launcher] Linked {} -> {}",
            link.display().to_string().cyan(),
            exec_target.display()
        );
        record.exec_link = Some(link);

        let (Some(desktop), Some(desktop_path)) =
            (framework.desktop.as_ref(), self.desktop_file_path(framework))
        else {
            return Ok(record);
        };
        fs::create_dir_all(&self.applications_dir)
            .map_err(|e| InstallError::io(&self.applications_dir, e))?;

        // Icon
        let mut icon_ref = None;
        if let Some(icon) = &desktop.icon {
            let source = install_path.join(icon);
            match self.icon_path(framework, &source) {
                Some(dest) if source.is_file() => {
                    fs::copy(&source, &dest).map_err(|e| InstallError::io(&dest, e))?;
                    icon_ref = Some(dest.clone());
                    record.icon = Some(dest);
                }
                _ => log_warn!(
                    "[Launcher] Icon {} not found in {}, desktop entry will have none",
                    icon,
                    install_path.display()
                ),
            }
        }

        // Desktop entry
        let content = desktop_entry(framework, &exec_target, icon_ref.as_deref());
        fs::write(&desktop_path, content).map_err(|e| InstallError::io(&desktop_path, e))?;
        log_info!(
            "[Launcher] Wrote desktop entry {}",
            desktop_path.display().to_string().cyan()
        );
        record.desktop_file = Some(desktop_path);
        Ok(record)
    }

    /// Removes every launcher artifact of `framework`. Missing artifacts are not an error.
    pub fn unregister(&self, framework: &FrameworkDescriptor) -> Result<usize, InstallError> {
        let mut removed = 0;
        let mut candidates = vec![self.exec_link_path(framework)];
        if let Some(desktop) = self.desktop_file_path(framework) {
            if let Some(icon) = framework.desktop.as_ref().and_then(|d| d.icon.as_deref()) {
                if let Some(icon_path) = self.icon_path(framework, Path::new(icon)) {
                    candidates.push(icon_path);
                }
            }
            candidates.push(desktop);
        }
        for path in candidates {
            if remove_if_present(&path)? {
                log_debug!("[Launcher] Removed {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Renders a freedesktop desktop entry.
pub fn desktop_entry(framework: &FrameworkDescriptor, exec: &Path, icon: Option<&Path>) -> String {
    let mut lines = vec![
        "[Desktop Entry]".to_string(),
        "Version=1.0".to_string(),
        "Type=Application".to_string(),
        format!("Name={}", framework.name),
        format!("Comment={}", framework.description),
        format!("Exec=\"{}\" %f", exec.display()),
        format!(
            "Icon={}",
            icon.map(|p| p.display().to_string()).unwrap_or_default()
        ),
    ];
    if let Some(desktop) = &framework.desktop {
        if let Some(categories) = &desktop.categories {
            lines.push(format!("Categories={categories}"));
        }
    }
    lines.push("Terminal=false".to_string());
    if let Some(extra) = framework.desktop.as_ref().and_then(|d| d.extra.as_ref()) {
        lines.extend(extra.lines().map(str::to_string));
    }
    let mut content = lines.join("\n");
    content.push('\n');
    content
}

/// Removes a file or symlink (dangling ones included). Returns whether something was there.
fn remove_if_present(path: &Path) -> Result<bool, InstallError> {
    match path.symlink_metadata() {
        Ok(_) => {
            fs::remove_file(path).map_err(|e| InstallError::io(path, e))?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(InstallError::io(path, e)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::schemas::framework::FrameworkRegistry;

    fn idea(variant: Option<&str>) -> FrameworkDescriptor {
        FrameworkRegistry::load(None)
            .unwrap()
            .find("ide", Some("idea"), variant)
            .unwrap()
    }

    fn fake_install(root: &Path) -> PathBuf {
        let install = root.join("ide/idea-eap");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::write(install.join("bin/idea.sh"), "#!/bin/sh\n").unwrap();
        fs::write(install.join("bin/idea.png"), "png").unwrap();
        install
    }

    #[test]
    fn registers_link_desktop_entry_and_icon() {
        let tmp = tempfile::tempdir().unwrap();
        let install = fake_install(tmp.path());
        let launcher = Launcher::new(tmp.path().join("bin"), tmp.path().join("applications"));
        let framework = idea(Some("eap"));

        let record = launcher.register(&framework, &install).unwrap();

        let link = record.exec_link.unwrap();
        assert_eq!(link, tmp.path().join("bin/idea-eap"));
        assert_eq!(fs::read_link(&link).unwrap(), install.join("bin/idea.sh"));

        let desktop = record.desktop_file.unwrap();
        assert_eq!(desktop.file_name().unwrap(), "jetbrains-idea-ce-eap.desktop");
        let content = fs::read_to_string(&desktop).unwrap();
        assert!(content.contains("Name=Idea EAP"));
        assert!(content.contains(&format!("Exec=\"{}\" %f", install.join("bin/idea.sh").display())));
        assert!(content.contains("Categories=Development;IDE;"));
        assert!(content.contains("StartupWMClass=jetbrains-idea-ce"));

        let icon = record.icon.unwrap();
        assert_eq!(icon, tmp.path().join("applications/jetbrains-idea-ce-eap.png"));
        assert!(content.contains(&format!("Icon={}", icon.display())));
    }

    #[test]
    fn register_twice_then_unregister() {
        let tmp = tempfile::tempdir().unwrap();
        let install = fake_install(tmp.path());
        let launcher = Launcher::new(tmp.path().join("bin"), tmp.path().join("applications"));
        let framework = idea(Some("eap"));

        launcher.register(&framework, &install).unwrap();
        launcher.register(&framework, &install).unwrap();
        assert_eq!(launcher.unregister(&framework).unwrap(), 3);
        assert_eq!(launcher.unregister(&framework).unwrap(), 0);
        assert!(!tmp.path().join("bin/idea-eap").exists());
    }

    #[test]
    fn command_line_tools_get_only_a_link() {
        let tmp = tempfile::tempdir().unwrap();
        let framework = FrameworkRegistry::load(None)
            .unwrap()
            .find("go", None, None)
            .unwrap();
        let launcher = Launcher::new(tmp.path().join("bin"), tmp.path().join("applications"));
        let record = launcher.register(&framework, tmp.path()).unwrap();
        assert!(record.exec_link.is_some());
        assert!(record.desktop_file.is_none());
        assert!(!tmp.path().join("applications").exists());
    }
}
