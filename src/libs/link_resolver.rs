//! # Download link resolution
//!
//! Some tools do not publish a stable archive URL; instead we download their HTML
//! download page and scan it line by line for the first link that fits this machine.
//! A line qualifies when it contains the framework's needle with `{arch}` replaced by
//! the translated architecture token (for Rust: `x86_64-unknown-linux-gnu.tar.gz">`).
//! The URL is then taken from the line's `href="..."` attribute.

use crate::schemas::errors::InstallError;
use crate::log_debug;
use colored::Colorize;

/// Outcome of feeding one line to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveStep {
    /// The link found on this line, if any.
    pub url: Option<String>,
    /// Whether following lines still need to be looked at.
    pub keep_scanning: bool,
}

/// Scans download pages for an architecture specific link.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    needle: String,
}

impl LinkResolver {
    /// Builds a resolver for `pattern` (containing `{arch}`) and an upstream architecture token.
    pub fn new(pattern: &str, arch_token: &str) -> Self {
        LinkResolver {
            needle: pattern.replace("{arch}", arch_token),
        }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// Looks at one line of the page.
    ///
    /// Once `scanning` is false the line is ignored and scanning stays off. A line carrying
    /// the needle without a parsable `href` is skipped: the next line may still match.
    pub fn resolve(&self, line: &str, scanning: bool) -> ResolveStep {
        if !scanning {
            return ResolveStep {
                url: None,
                keep_scanning: false,
            };
        }
        if !line.contains(&self.needle) {
            return ResolveStep {
                url: None,
                keep_scanning: true,
            };
        }
        match extract_href(line) {
            Some(url) => {
                log_debug!("[Resolver] Found link: {}", url.blue());
                ResolveStep {
                    url: Some(url.to_string()),
                    keep_scanning: false,
                }
            }
            None => {
                log_debug!(
                    "[Resolver] Line matches '{}' but has no usable href, skipping: {}",
                    self.needle,
                    line.trim().dimmed()
                );
                ResolveStep {
                    url: None,
                    keep_scanning: true,
                }
            }
        }
    }

    /// Runs [`resolve`](Self::resolve) over a whole page in document order.
    /// Returns the first qualifying link, or `None` when the page has none.
    pub fn scan_page(&self, page: &str) -> Option<String> {
        let mut scanning = true;
        for line in page.lines() {
            let step = self.resolve(line, scanning);
            if step.url.is_some() {
                return step.url;
            }
            scanning = step.keep_scanning;
            if !scanning {
                break;
            }
        }
        None
    }
}

/// Pulls the value out of an `href="<url>">` attribute. The value must be non-empty and
/// free of whitespace, and the attribute must close the tag.
fn extract_href(line: &str) -> Option<&str> {
    let mut rest = line;
    while let Some(start) = rest.find("href=\"") {
        let after = &rest[start + "href=\"".len()..];
        if let Some(end) = after.find("\">") {
            let candidate = &after[..end];
            if !candidate.is_empty() && !candidate.chars().any(char::is_whitespace) {
                return Some(candidate);
            }
        }
        rest = after;
    }
    None
}

/// Makes `link` absolute relative to the page it was found on.
pub fn absolutize(page_url: &str, link: &str) -> Result<String, InstallError> {
    let base = url::Url::parse(page_url)
        .map_err(|e| InstallError::Config(format!("invalid download page '{page_url}': {e}")))?;
    base.join(link)
        .map(|u| u.to_string())
        .map_err(|e| InstallError::Network(format!("unusable link '{link}' on {page_url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rust_resolver(token: &str) -> LinkResolver {
        LinkResolver::new("{arch}-unknown-linux-gnu.tar.gz\">", token)
    }

    #[test]
    fn rust_line_on_amd64() {
        let resolver = rust_resolver("x86_64");
        let step = resolver.resolve(
            r#"<td><a href="rust-1.2.0-x86_64-unknown-linux-gnu.tar.gz">"#,
            true,
        );
        assert_eq!(
            step,
            ResolveStep {
                url: Some("rust-1.2.0-x86_64-unknown-linux-gnu.tar.gz".to_string()),
                keep_scanning: false,
            }
        );
    }

    #[rstest]
    #[case("x86_64", "https://static.example.org/rust-1.2.0-x86_64-unknown-linux-gnu.tar.gz")]
    #[case("i686", "https://static.example.org/rust-1.2.0-i686-unknown-linux-gnu.tar.gz")]
    fn first_match_wins_per_arch(#[case] token: &str, #[case] expected: &str) {
        let page = format!(
            r#"<html>
<a href="https://static.example.org/rust-1.2.0-aarch64-unknown-linux-gnu.tar.gz">aarch64</a>
<a href="{expected}">first</a>
<a href="https://static.example.org/rust-1.1.0-{token}-unknown-linux-gnu.tar.gz">second</a>
</html>"#
        );
        assert_eq!(rust_resolver(token).scan_page(&page).as_deref(), Some(expected));
    }

    #[test]
    fn page_without_match_returns_none() {
        let page = "<html>\n<a href=\"other.zip\">other</a>\n</html>\n";
        assert_eq!(rust_resolver("x86_64").scan_page(page), None);
        assert_eq!(rust_resolver("x86_64").scan_page(""), None);
    }

    #[test]
    fn malformed_matching_line_is_skipped() {
        let page = r#"
<a href="">x86_64-unknown-linux-gnu.tar.gz">broken</a>
<a href = x86_64-unknown-linux-gnu.tar.gz">broken too</a>
<a href="good-x86_64-unknown-linux-gnu.tar.gz">good</a>
"#;
        assert_eq!(
            rust_resolver("x86_64").scan_page(page).as_deref(),
            Some("good-x86_64-unknown-linux-gnu.tar.gz")
        );
    }

    #[test]
    fn stopped_resolver_ignores_lines() {
        let step = rust_resolver("x86_64").resolve(
            r#"<a href="rust-x86_64-unknown-linux-gnu.tar.gz">"#,
            false,
        );
        assert_eq!(step.url, None);
        assert!(!step.keep_scanning);
    }

    #[test]
    fn relative_links_are_joined_with_the_page() {
        assert_eq!(
            absolutize("https://example.org/dl/index.html", "rust.tar.gz").unwrap(),
            "https://example.org/dl/rust.tar.gz"
        );
        assert_eq!(
            absolutize("https://example.org/dl/index.html", "/files/rust.tar.gz").unwrap(),
            "https://example.org/files/rust.tar.gz"
        );
        assert_eq!(
            absolutize("https://example.org/dl/", "https://cdn.example.org/a.tgz").unwrap(),
            "https://cdn.example.org/a.tgz"
        );
    }
}
