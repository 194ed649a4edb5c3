// Our custom logging macros for nicely formatted output.
use crate::{log_debug, log_warn};
// The 'colored' crate helps us make our console output readable.
use colored::Colorize;

/// Detects the current machine's canonical architecture token.
///
/// Canonical tokens follow the distribution naming used by framework tables
/// (`amd64`, `i386`, `arm64`, `armhf`), not the compiler's naming. Frameworks then
/// translate the canonical token into whatever their upstream file names use.
///
/// `DEVMAKE_ARCH` overrides detection, which lets a table be exercised for another
/// architecture than the one we run on.
///
/// # Returns
/// * `String`: the canonical architecture token.
pub fn detect_architecture() -> String {
    if let Ok(forced) = std::env::var("DEVMAKE_ARCH") {
        if !forced.trim().is_empty() {
            log_debug!("[Platform] Architecture forced by DEVMAKE_ARCH: {}", forced.magenta());
            return forced.trim().to_string();
        }
    }
    // `std::env::consts::ARCH` is the target architecture this binary was compiled for.
    let arch = normalize_arch(std::env::consts::ARCH);
    log_debug!("[Platform] Detected architecture: {}", arch.magenta());
    arch
}

/// Normalizes compiler and kernel architecture names into canonical tokens.
///
/// # Arguments
/// * `arch`: an architecture name (e.g. "x86_64", "aarch64", "i686").
///
/// # Returns
/// * `String`: the canonical token (e.g. "amd64", "arm64", "i386").
///   Unknown names are returned lowercased, as-is.
pub fn normalize_arch(arch: &str) -> String {
    match arch.to_lowercase().as_str() {
        "x86_64" | "amd64" => "amd64".to_string(),
        "x86" | "i386" | "i486" | "i586" | "i686" => "i386".to_string(),
        "aarch64" | "arm64" => "arm64".to_string(),
        "arm" | "armv7" | "armv7l" | "armhf" => "armhf".to_string(),
        other => {
            log_warn!(
                "[Platform] Unknown architecture '{}', using as-is. Frameworks may not have a mapping for it.",
                other.purple()
            );
            other.to_string()
        }
    }
}
