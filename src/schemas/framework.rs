//! # Framework descriptors and registry
//!
//! A *framework* is one installable tool (an IDE, a language toolchain). Frameworks are
//! grouped in categories (`ide`, `rust`, `go`, ...) and described entirely by data: the
//! YAML table below is parsed once at startup into a [`FrameworkRegistry`], and every
//! installation works from an immutable [`FrameworkDescriptor`] resolved out of it.
//!
//! ```yaml
//! categories:
//!   - id: rust
//!     name: Rust
//!     description: Rust language
//!     frameworks:
//!       - id: rust-lang
//!         name: Rust Lang
//!         description: The official Rust distribution
//!         category_default: true
//!         only_on_archs: [i386, amd64]
//!         arch_trans: { amd64: x86_64, i386: i686 }
//!         download_page: https://www.rust-lang.org/en-US/other-installers.html
//!         link_pattern: '{arch}-unknown-linux-gnu.tar.gz">'
//!         strip_pattern: rust-*
//!         executables: [rustc/bin/rustc, cargo/bin/cargo]
//!         post_install:
//!           - kind: env
//!             vars:
//!               PATH: '{install_path}/rustc/bin:{install_path}/cargo/bin:$HOME/.cargo/bin'
//! ```
//!
//! Tool specific behaviour after extraction is expressed as a list of [`PostInstallHook`]
//! variants instead of per-tool code.

use crate::schemas::errors::InstallError;
use crate::{log_debug, log_warn};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The framework table shipped with the binary.
const BUILTIN_FRAMEWORKS: &str = include_str!("../../assets/frameworks.yaml");

// ============================================================================
// RAW TABLE (as written in YAML)
// ============================================================================

/// Top level of a framework table file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkTable {
    pub categories: Vec<CategoryEntry>,
}

/// A group of related frameworks, addressed by `id` on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub frameworks: Vec<FrameworkEntry>,
}

/// One installable tool as written in the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Picked when the user names only the category.
    #[serde(default)]
    pub category_default: bool,
    /// Canonical architectures this tool is published for. Empty means any.
    #[serde(default)]
    pub only_on_archs: Vec<String>,
    /// Canonical architecture -> token used in the upstream file names.
    #[serde(default)]
    pub arch_trans: BTreeMap<String, String>,
    /// HTML page scanned line by line for the download link.
    #[serde(default)]
    pub download_page: Option<String>,
    /// Archive URL used as is, no scraping.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Needle a page line must contain to qualify; `{arch}` is replaced by the translated token.
    #[serde(default)]
    pub link_pattern: Option<String>,
    /// `sha256:<hex>`, `sha512:<hex>` or a bare sha256 hex digest.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Glob naming the single top-level directory to hoist out of the archive.
    #[serde(default)]
    pub strip_pattern: Option<String>,
    /// Paths relative to the install dir that must exist and are marked executable.
    /// The first one is the tool's main executable.
    #[serde(default)]
    pub executables: Vec<String>,
    #[serde(default)]
    pub desktop: Option<DesktopEntry>,
    #[serde(default)]
    pub post_install: Vec<PostInstallHook>,
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
}

/// An alternative flavour of a framework (e.g. an EAP build). Only the fields that
/// differ are given; everything else is inherited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantEntry {
    /// Name used with `--variant`, also appended to install dir and desktop file names.
    pub id: String,
    /// Appended to the display name (`Idea` -> `Idea EAP`).
    #[serde(default)]
    pub name_suffix: Option<String>,
    #[serde(default)]
    pub download_page: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub link_pattern: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Data needed to write a `.desktop` launcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopEntry {
    /// File name without the `.desktop` suffix, e.g. `jetbrains-idea-ce`.
    pub file_name: String,
    /// Icon path relative to the install dir.
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
}

/// A step run after extraction. Selected by data, executed by `libs::post_install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostInstallHook {
    /// Register environment variables in the user profile. `PATH` values are prepended.
    Env { vars: BTreeMap<String, String> },
    /// Symlink every entry of `from` into `to` (both relative to the install dir).
    SymlinkFarm { from: String, to: String },
    /// Show a license and require the user to accept it.
    License {
        text: String,
        #[serde(default = "default_accept_token")]
        accept_token: String,
    },
    /// Display an informational message.
    Message { text: String },
}

fn default_accept_token() -> String {
    "a".to_string()
}

// ============================================================================
// RESOLVED DESCRIPTOR
// ============================================================================

/// Where the archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// Direct archive URL.
    Direct(String),
    /// Page to scrape, with the (unsubstituted) line needle.
    Page { url: String, link_pattern: String },
}

/// Immutable description of one tool variant, ready to be installed.
#[derive(Debug, Clone)]
pub struct FrameworkDescriptor {
    pub category: String,
    pub id: String,
    pub variant: Option<String>,
    pub name: String,
    pub description: String,
    pub only_on_archs: Vec<String>,
    pub arch_trans: BTreeMap<String, String>,
    pub source: DownloadSource,
    pub checksum: Option<String>,
    pub strip_pattern: Option<String>,
    pub executables: Vec<String>,
    pub desktop: Option<DesktopEntry>,
    pub post_install: Vec<PostInstallHook>,
}

impl FrameworkDescriptor {
    /// Builds a descriptor for `entry`, optionally specialised to one of its variants.
    pub fn from_entry(
        category: &str,
        entry: &FrameworkEntry,
        variant: Option<&VariantEntry>,
    ) -> Result<Self, InstallError> {
        let download_page = variant
            .and_then(|v| v.download_page.clone())
            .or_else(|| entry.download_page.clone());
        let download_url = variant
            .and_then(|v| v.download_url.clone())
            .or_else(|| entry.download_url.clone());
        let link_pattern = variant
            .and_then(|v| v.link_pattern.clone())
            .or_else(|| entry.link_pattern.clone());

        // A variant overriding one kind of source hides the other kind from the base entry.
        let (download_page, download_url) = match variant {
            Some(v) if v.download_url.is_some() => (None, download_url),
            Some(v) if v.download_page.is_some() => (download_page, None),
            _ => (download_page, download_url),
        };

        let source = match (download_page, download_url) {
            (Some(_), Some(_)) => {
                return Err(InstallError::Config(format!(
                    "framework '{}' declares both download_page and download_url",
                    entry.id
                )));
            }
            (None, None) => {
                return Err(InstallError::Config(format!(
                    "framework '{}' declares neither download_page nor download_url",
                    entry.id
                )));
            }
            (None, Some(url)) => DownloadSource::Direct(url),
            (Some(url), None) => match link_pattern {
                Some(link_pattern) if !link_pattern.trim().is_empty() => {
                    DownloadSource::Page { url, link_pattern }
                }
                _ => {
                    return Err(InstallError::Config(format!(
                        "framework '{}' scrapes a download page but has no link_pattern",
                        entry.id
                    )));
                }
            },
        };

        // A digest describes one archive: a variant with its own source only uses its own.
        let checksum = match variant {
            Some(v) if v.download_url.is_some() || v.download_page.is_some() => v.checksum.clone(),
            Some(v) => v.checksum.clone().or_else(|| entry.checksum.clone()),
            None => entry.checksum.clone(),
        };

        let name = match variant.and_then(|v| v.name_suffix.as_deref()) {
            Some(suffix) => format!("{}{}", entry.name, suffix),
            None => entry.name.clone(),
        };

        Ok(FrameworkDescriptor {
            category: category.to_string(),
            id: entry.id.clone(),
            variant: variant.map(|v| v.id.clone()),
            name,
            description: entry.description.clone(),
            only_on_archs: entry.only_on_archs.clone(),
            arch_trans: entry.arch_trans.clone(),
            source,
            checksum,
            strip_pattern: entry.strip_pattern.clone(),
            executables: entry.executables.clone(),
            desktop: entry.desktop.clone(),
            post_install: entry.post_install.clone(),
        })
    }

    /// Directory name below the category dir: `idea`, `idea-eap`.
    pub fn dir_name(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}-{}", self.id, v),
            None => self.id.clone(),
        }
    }

    /// Default install location: `<install_base>/<category>/<id>[-variant]`.
    pub fn default_install_path(&self, install_base: &Path) -> PathBuf {
        install_base.join(&self.category).join(self.dir_name())
    }

    /// Desktop entry file name, e.g. `jetbrains-idea-ce-eap.desktop`.
    pub fn desktop_file_name(&self) -> Option<String> {
        self.desktop.as_ref().map(|d| match &self.variant {
            Some(v) => format!("{}-{}.desktop", d.file_name, v),
            None => format!("{}.desktop", d.file_name),
        })
    }

    /// The tool's main executable, relative to the install dir.
    pub fn main_executable(&self) -> Option<&str> {
        self.executables.first().map(String::as_str)
    }

    /// Checks that the current machine can run this tool and returns the upstream
    /// architecture token. Must be called before any network activity.
    pub fn arch_token(&self, arch: &str) -> Result<String, InstallError> {
        if !self.only_on_archs.is_empty() && !self.only_on_archs.iter().any(|a| a == arch) {
            return Err(InstallError::Config(format!(
                "{} is only supported on {} (this machine is {})",
                self.name,
                self.only_on_archs.join(", "),
                arch
            )));
        }
        if self.arch_trans.is_empty() {
            return Ok(arch.to_string());
        }
        self.arch_trans.get(arch).cloned().ok_or_else(|| {
            InstallError::Config(format!(
                "no architecture mapping for '{}' in framework '{}'",
                arch, self.id
            ))
        })
    }
}

impl fmt::Display for FrameworkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.dir_name())
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Every known framework, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct FrameworkRegistry {
    categories: Vec<CategoryEntry>,
}

impl FrameworkRegistry {
    /// Loads the table from `path`, or the built-in table when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, InstallError> {
        let contents = match path {
            Some(p) => {
                log_debug!(
                    "[Registry] Loading framework table from {}",
                    p.display().to_string().cyan()
                );
                fs::read_to_string(p).map_err(|e| InstallError::io(p, e))?
            }
            None => {
                log_debug!("[Registry] Loading built-in framework table");
                BUILTIN_FRAMEWORKS.to_string()
            }
        };
        Self::from_yaml(&contents)
    }

    /// Parses and validates a YAML table.
    pub fn from_yaml(contents: &str) -> Result<Self, InstallError> {
        let table: FrameworkTable = serde_yaml::from_str(contents)
            .map_err(|e| InstallError::Config(format!("malformed framework table: {e}")))?;
        let registry = FrameworkRegistry {
            categories: table.categories,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Rejects duplicate ids and descriptors that cannot be resolved.
    fn validate(&self) -> Result<(), InstallError> {
        let mut seen_categories = Vec::new();
        for category in &self.categories {
            if seen_categories.contains(&&category.id) {
                return Err(InstallError::Config(format!(
                    "duplicate category '{}'",
                    category.id
                )));
            }
            seen_categories.push(&category.id);

            let mut seen = Vec::new();
            for entry in &category.frameworks {
                if seen.contains(&&entry.id) {
                    return Err(InstallError::Config(format!(
                        "duplicate framework '{}' in category '{}'",
                        entry.id, category.id
                    )));
                }
                seen.push(&entry.id);
                let env_hooks = entry
                    .post_install
                    .iter()
                    .filter(|h| matches!(h, PostInstallHook::Env { .. }))
                    .count();
                if env_hooks > 1 {
                    return Err(InstallError::Config(format!(
                        "framework '{}' declares {} env hooks, merge them into one",
                        entry.id, env_hooks
                    )));
                }
                FrameworkDescriptor::from_entry(&category.id, entry, None)?;
                for variant in &entry.variants {
                    FrameworkDescriptor::from_entry(&category.id, entry, Some(variant))?;
                }
            }

            let defaults = category
                .frameworks
                .iter()
                .filter(|f| f.category_default)
                .count();
            if defaults > 1 {
                log_warn!(
                    "[Registry] Category '{}' has {} default frameworks, the first one wins",
                    category.id.yellow(),
                    defaults
                );
            }
        }
        Ok(())
    }

    pub fn categories(&self) -> &[CategoryEntry] {
        &self.categories
    }

    /// Whether `category` has a framework called `framework`.
    pub fn contains(&self, category: &str, framework: &str) -> bool {
        self.categories
            .iter()
            .filter(|c| c.id == category)
            .any(|c| c.frameworks.iter().any(|f| f.id == framework))
    }

    /// Resolves `category [framework] [--variant v]` to a descriptor.
    /// Without a framework id the category default is used.
    pub fn find(
        &self,
        category: &str,
        framework: Option<&str>,
        variant: Option<&str>,
    ) -> Result<FrameworkDescriptor, InstallError> {
        let cat = self
            .categories
            .iter()
            .find(|c| c.id == category)
            .ok_or_else(|| InstallError::Config(format!("unknown category '{category}'")))?;

        let entry = match framework {
            Some(id) => cat.frameworks.iter().find(|f| f.id == id).ok_or_else(|| {
                InstallError::Config(format!("unknown framework '{id}' in category '{category}'"))
            })?,
            None => cat
                .frameworks
                .iter()
                .find(|f| f.category_default)
                .ok_or_else(|| {
                    InstallError::Config(format!(
                        "category '{category}' has no default framework, name one explicitly"
                    ))
                })?,
        };

        let variant_entry = match variant {
            Some(v) => Some(entry.variants.iter().find(|e| e.id == v).ok_or_else(|| {
                InstallError::Config(format!(
                    "framework '{}' has no variant '{}'",
                    entry.id, v
                ))
            })?),
            None => None,
        };

        FrameworkDescriptor::from_entry(&cat.id, entry, variant_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
categories:
  - id: ide
    name: IDE
    frameworks:
      - id: idea
        name: Idea
        category_default: true
        download_url: https://example.com/idea.tar.gz
        executables: [bin/idea.sh]
        desktop:
          file_name: jetbrains-idea-ce
        variants:
          - id: eap
            name_suffix: " EAP"
            download_page: https://example.com/eap.html
            link_pattern: 'idea-{arch}.tar.gz'
  - id: rust
    name: Rust
    frameworks:
      - id: rust-lang
        name: Rust Lang
        category_default: true
        only_on_archs: [i386, amd64]
        arch_trans: { amd64: x86_64, i386: i686 }
        download_page: https://example.com/rust.html
        link_pattern: '{arch}-unknown-linux-gnu.tar.gz">'
        strip_pattern: rust-*
        post_install:
          - kind: env
            vars:
              PATH: '{install_path}/bin'
"#;

    #[test]
    fn variants_get_distinct_paths_and_desktop_files() {
        let registry = FrameworkRegistry::from_yaml(TABLE).unwrap();
        let base = Path::new("/opt/devmake");

        let idea = registry.find("ide", Some("idea"), None).unwrap();
        let eap = registry.find("ide", Some("idea"), Some("eap")).unwrap();

        assert_eq!(idea.default_install_path(base), base.join("ide/idea"));
        assert_eq!(eap.default_install_path(base), base.join("ide/idea-eap"));
        assert_eq!(idea.desktop_file_name().unwrap(), "jetbrains-idea-ce.desktop");
        assert_eq!(eap.desktop_file_name().unwrap(), "jetbrains-idea-ce-eap.desktop");
        assert_eq!(eap.name, "Idea EAP");
        assert!(matches!(eap.source, DownloadSource::Page { .. }));
        assert!(matches!(idea.source, DownloadSource::Direct(_)));
    }

    #[test]
    fn category_alone_picks_the_default() {
        let registry = FrameworkRegistry::from_yaml(TABLE).unwrap();
        let rust = registry.find("rust", None, None).unwrap();
        assert_eq!(rust.id, "rust-lang");
        assert_eq!(rust.post_install.len(), 1);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        let registry = FrameworkRegistry::from_yaml(TABLE).unwrap();
        for err in [
            registry.find("nope", None, None).unwrap_err(),
            registry.find("ide", Some("nope"), None).unwrap_err(),
            registry.find("ide", Some("idea"), Some("nightly")).unwrap_err(),
        ] {
            assert_eq!(err.kind(), "ConfigError");
        }
    }

    #[test]
    fn arch_token_uses_translation_table() {
        let registry = FrameworkRegistry::from_yaml(TABLE).unwrap();
        let rust = registry.find("rust", None, None).unwrap();
        assert_eq!(rust.arch_token("amd64").unwrap(), "x86_64");
        assert_eq!(rust.arch_token("i386").unwrap(), "i686");
        // Not in only_on_archs.
        assert_eq!(rust.arch_token("arm64").unwrap_err().kind(), "ConfigError");

        let idea = registry.find("ide", None, None).unwrap();
        assert_eq!(idea.arch_token("arm64").unwrap(), "arm64");
    }

    #[test]
    fn variant_with_its_own_source_does_not_inherit_the_checksum() {
        let table = format!(
            r#"
categories:
  - id: ide
    name: IDE
    frameworks:
      - id: idea
        name: Idea
        download_url: https://example.com/idea.tar.gz
        checksum: 'sha256:{base}'
        variants:
          - id: eap
            download_url: https://example.com/idea-eap.tar.gz
          - id: signed
            download_url: https://example.com/idea-signed.tar.gz
            checksum: 'sha256:{own}'
          - id: renamed
            name_suffix: ' (renamed)'
"#,
            base = "a".repeat(64),
            own = "b".repeat(64),
        );
        let registry = FrameworkRegistry::from_yaml(&table).unwrap();

        let eap = registry.find("ide", Some("idea"), Some("eap")).unwrap();
        assert_eq!(
            eap.source,
            DownloadSource::Direct("https://example.com/idea-eap.tar.gz".to_string())
        );
        assert!(eap.checksum.is_none());

        let signed = registry.find("ide", Some("idea"), Some("signed")).unwrap();
        assert_eq!(signed.checksum, Some(format!("sha256:{}", "b".repeat(64))));

        // Same archive as the base entry, so the same digest.
        let renamed = registry.find("ide", Some("idea"), Some("renamed")).unwrap();
        assert_eq!(renamed.checksum, Some(format!("sha256:{}", "a".repeat(64))));
    }

    #[test]
    fn unmapped_architecture_is_a_config_error() {
        let table = r#"
categories:
  - id: lang
    name: Languages
    frameworks:
      - id: tool
        name: Tool
        only_on_archs: [amd64, arm64]
        arch_trans:
          amd64: x86_64
        download_url: https://example.com/tool.tar.gz
"#;
        let tool = FrameworkRegistry::from_yaml(table)
            .unwrap()
            .find("lang", Some("tool"), None)
            .unwrap();
        assert_eq!(tool.arch_token("amd64").unwrap(), "x86_64");
        let err = tool.arch_token("arm64").unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("no architecture mapping for 'arm64'"));
    }

    #[test]
    fn duplicate_env_hooks_are_rejected() {
        let table = r#"
categories:
  - id: go
    name: Go
    frameworks:
      - id: go-lang
        name: Go
        download_url: https://example.com/go.tar.gz
        post_install:
          - kind: env
            vars: { PATH: '{install_path}/bin' }
          - kind: env
            vars: { GOROOT: '{install_path}' }
"#;
        let err = FrameworkRegistry::from_yaml(table).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("2 env hooks"));
    }

    #[test]
    fn page_source_without_pattern_is_rejected() {
        let table = r#"
categories:
  - id: go
    name: Go
    frameworks:
      - id: go-lang
        name: Go
        download_page: https://example.com/dl
"#;
        let err = FrameworkRegistry::from_yaml(table).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn builtin_table_loads() {
        let registry = FrameworkRegistry::load(None).unwrap();
        assert!(registry.find("rust", None, None).is_ok());
    }
}
