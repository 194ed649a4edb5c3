// Archive fetching: download pages and archives over HTTP(S) (or from `file://` mirrors),
// stream archives to a hidden temp file while hashing them, and only move a verified
// download to its final name.

use crate::libs::utilities::deadline::Deadline;
use crate::schemas::errors::InstallError;
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Receives `(bytes_so_far, total_if_known)` while an archive streams in.
/// Informational only.
pub type ProgressSink<'a> = &'a mut dyn FnMut(u64, Option<u64>);

const CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// CHECKSUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Sha256,
    Sha512,
}

/// An expected digest, written `sha256:<hex>`, `sha512:<hex>` or as a bare sha256 hex string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algo: ChecksumAlgo,
    pub hex: String,
}

impl FromStr for Checksum {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (algo, hex) = match s.split_once(':') {
            Some(("sha256", hex)) => (ChecksumAlgo::Sha256, hex),
            Some(("sha512", hex)) => (ChecksumAlgo::Sha512, hex),
            Some((other, _)) => {
                return Err(InstallError::Config(format!(
                    "unsupported checksum algorithm '{other}'"
                )));
            }
            None => (ChecksumAlgo::Sha256, s),
        };
        let expected_len = match algo {
            ChecksumAlgo::Sha256 => 64,
            ChecksumAlgo::Sha512 => 128,
        };
        if hex.len() != expected_len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InstallError::Config(format!("malformed checksum '{s}'")));
        }
        Ok(Checksum {
            algo,
            hex: hex.to_lowercase(),
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.algo {
            ChecksumAlgo::Sha256 => write!(f, "sha256:{}", self.hex),
            ChecksumAlgo::Sha512 => write!(f, "sha512:{}", self.hex),
        }
    }
}

/// Streaming hasher for whichever algorithm the expected checksum uses.
enum StreamHasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    fn new(algo: ChecksumAlgo) -> Self {
        match algo {
            ChecksumAlgo::Sha256 => StreamHasher::Sha256(Sha256::new()),
            ChecksumAlgo::Sha512 => StreamHasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Sha256(h) => format!("{:x}", h.finalize()),
            StreamHasher::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

// ============================================================================
// DOWNLOADS
// ============================================================================

/// One archive to bring in: where from, where to, and what it must hash to.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    /// Final location of the archive; only written once the download is verified.
    pub dest: PathBuf,
    pub checksum: Option<Checksum>,
}

impl DownloadTask {
    /// Directory holding the temp file while the archive streams in: the one of `dest`,
    /// so the final rename never crosses filesystems.
    fn staging_dir(&self) -> &Path {
        self.dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// A completed download that still lives under its temp name.
/// Dropping it deletes the temp file.
#[derive(Debug)]
pub struct DownloadedArchive {
    pub url: String,
    temp: NamedTempFile,
    /// Digest of the received bytes, computed with the expected checksum's algorithm.
    digest: Option<String>,
    /// Size of the payload as received.
    pub bytes: u64,
}

impl DownloadedArchive {
    /// Compares the received bytes with `expected`.
    ///
    /// # Arguments
    /// * `expected`: the published digest, `None` when the framework publishes none.
    ///
    /// # Returns
    /// * `Ok(())` when the digests match or there is nothing to compare against.
    /// * `Err(InstallError::Checksum)` otherwise. The caller then drops `self`, which
    ///   removes the temp file.
    pub fn verify(&self, expected: Option<&Checksum>) -> Result<(), InstallError> {
        let Some(expected) = expected else {
            log_debug!("[Fetcher] No checksum published for {}, skipping verification", self.url);
            return Ok(());
        };
        // The digest was computed while streaming, with the algorithm of `expected`.
        let actual = self.digest.clone().unwrap_or_default();
        if actual != expected.hex {
            return Err(InstallError::Checksum {
                url: self.url.clone(),
                expected: expected.hex.clone(),
                actual,
            });
        }
        log_debug!("[Fetcher] Checksum OK ({})", expected.to_string().green());
        Ok(())
    }

    /// Renames the temp file to `dest` atomically (same directory).
    pub fn persist(self, dest: &Path) -> Result<PathBuf, InstallError> {
        self.temp
            .persist(dest)
            .map_err(|e| InstallError::io(dest, e.error))?;
        Ok(dest.to_path_buf())
    }
}

/// HTTP client wrapper plus the operation timeout applied to downloads.
pub struct Fetcher {
    agent: ureq::Agent,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30).min(timeout))
            .timeout_read(Duration::from_secs(60).min(timeout))
            .user_agent(concat!("devmake/", env!("CARGO_PKG_VERSION")))
            .build();
        Fetcher { agent, timeout }
    }

    /// Downloads a page (the HTML index of a tool's downloads) as text.
    pub fn fetch_page(&self, url: &str) -> Result<String, InstallError> {
        log_debug!("[Fetcher] Fetching download page {}", url.blue());
        let deadline = Deadline::start(format!("fetching {url}"), self.timeout);
        let (mut reader, _) = self.open(url)?;
        let mut body = Vec::new();
        copy_with_deadline(&mut reader, &mut body, &deadline, None, None)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Streams `task.url` into a hidden temp file next to `task.dest`, hashing as it goes.
    ///
    /// Nothing is written at `task.dest` yet: the returned [`DownloadedArchive`] must be
    /// verified against `task.checksum` and then persisted, which yields the local path.
    ///
    /// # Arguments
    /// * `task`: what to download and where it will end up.
    /// * `progress`: optional sink for `(bytes_so_far, total_if_known)`.
    ///
    /// # Returns
    /// * `Ok(DownloadedArchive)` once every byte is on disk.
    /// * `Err(InstallError::Network)` for unreachable hosts, HTTP errors and broken transfers.
    /// * `Err(InstallError::Timeout)` when the operation timeout runs out.
    pub fn fetch(
        &self,
        task: &DownloadTask,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<DownloadedArchive, InstallError> {
        let url = task.url.as_str();
        log_info!("[Fetcher] Downloading {}", url.blue());
        let deadline = Deadline::start(format!("downloading {url}"), self.timeout);
        let (mut reader, total) = self.open(url)?;

        // The temp file lives in the destination directory so `persist` is a plain rename.
        let dir = task.staging_dir();
        std::fs::create_dir_all(dir).map_err(|e| InstallError::io(dir, e))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".devmake-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| InstallError::io(dir, e))?;

        // Hash with the algorithm the expected digest uses, if there is one.
        let mut hasher = task.checksum.as_ref().map(|c| StreamHasher::new(c.algo));
        let bytes = copy_with_deadline(
            &mut reader,
            temp.as_file_mut(),
            &deadline,
            hasher.as_mut(),
            progress.map(|p| (p, total)),
        )
        .map_err(|e| match e {
            // A read error mid-stream is the network's fault, not the disk's.
            InstallError::Io { source, .. } => InstallError::Network(format!(
                "transfer of {url} interrupted: {source}"
            )),
            other => other,
        })?;
        temp.as_file_mut()
            .flush()
            .map_err(|e| InstallError::io(temp.path(), e))?;

        log_debug!(
            "[Fetcher] Received {} bytes into {}",
            bytes,
            temp.path().display().to_string().dimmed()
        );
        Ok(DownloadedArchive {
            url: url.to_string(),
            temp,
            digest: hasher.map(StreamHasher::finalize_hex),
            bytes,
        })
    }

    /// Opens a reader on `url`, returning the announced length when known.
    fn open(&self, url: &str) -> Result<(Box<dyn Read + Send>, Option<u64>), InstallError> {
        if url.starts_with("file://") {
            let path = url::Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| InstallError::Config(format!("invalid file URL '{url}'")))?;
            let file = File::open(&path)
                .map_err(|e| InstallError::Network(format!("cannot open {url}: {e}")))?;
            let len = file.metadata().ok().map(|m| m.len());
            return Ok((Box::new(file), len));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(InstallError::Config(format!(
                "unsupported URL scheme in '{url}', expected http://, https:// or file://"
            )));
        }

        match self.agent.get(url).call() {
            Ok(response) => {
                let len = response
                    .header("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok());
                Ok((Box::new(response.into_reader()), len))
            }
            Err(ureq::Error::Status(code, _)) => Err(InstallError::Network(format!(
                "{url} answered with HTTP status {code}"
            ))),
            Err(ureq::Error::Transport(t)) => {
                log_warn!("[Fetcher] Transport failure for {}: {}", url.red(), t);
                Err(InstallError::Network(format!("cannot reach {url}: {t}")))
            }
        }
    }
}

/// Copies `reader` into `writer` chunk by chunk, feeding the hasher and the progress sink,
/// and checking the deadline between chunks.
fn copy_with_deadline(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    deadline: &Deadline,
    mut hasher: Option<&mut StreamHasher>,
    mut progress: Option<(ProgressSink<'_>, Option<u64>)>,
) -> Result<u64, InstallError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        deadline.check()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(deadline.to_error()),
            Err(e) => return Err(InstallError::io("<network stream>", e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| InstallError::io("<download>", e))?;
        if let Some(h) = hasher.as_deref_mut() {
            h.update(&buf[..n]);
        }
        written += n as u64;
        if let Some((sink, total)) = progress.as_mut() {
            (**sink)(written, *total);
        }
    }
    Ok(written)
}

/// Picks a file name for a downloaded archive from its URL: the last path segment,
/// or `download` when the URL ends with a slash or only carries a query.
pub fn archive_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    fn file_url(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn checksum_parsing() {
        let hex = sha256_hex(b"abc");
        assert_eq!(
            Checksum::from_str(&format!("sha256:{hex}")).unwrap(),
            Checksum {
                algo: ChecksumAlgo::Sha256,
                hex: hex.clone()
            }
        );
        assert_eq!(Checksum::from_str(&hex.to_uppercase()).unwrap().hex, hex);
        assert!(Checksum::from_str("md5:abc").is_err());
        assert!(Checksum::from_str("sha256:1234").is_err());
    }

    #[test]
    fn verified_download_lands_at_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("tool.tar.gz");
        fs::write(&src, b"payload bytes").unwrap();
        let dest = tmp.path().join("cache").join("tool.tar.gz");

        let task = DownloadTask {
            url: file_url(&src),
            dest: dest.clone(),
            checksum: Some(Checksum::from_str(&sha256_hex(b"payload bytes")).unwrap()),
        };
        let mut seen = Vec::new();
        let mut sink = |done: u64, total: Option<u64>| seen.push((done, total));
        let downloaded = Fetcher::new(Duration::from_secs(30))
            .fetch(&task, Some(&mut sink))
            .unwrap();
        assert_eq!(downloaded.bytes, 13);
        // Nothing at the final name before verification.
        assert!(!dest.exists());

        downloaded.verify(task.checksum.as_ref()).unwrap();
        let path = downloaded.persist(&task.dest).unwrap();

        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"payload bytes");
        assert_eq!(seen.last(), Some(&(13, Some(13))));
    }

    #[test]
    fn checksum_mismatch_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("tool.tar.gz");
        fs::write(&src, b"tampered").unwrap();
        let cache = tmp.path().join("cache");
        let dest = cache.join("tool.tar.gz");

        let task = DownloadTask {
            url: file_url(&src),
            dest: dest.clone(),
            checksum: Some(Checksum::from_str(&sha256_hex(b"original")).unwrap()),
        };
        let downloaded = Fetcher::new(Duration::from_secs(30))
            .fetch(&task, None)
            .unwrap();
        let err = downloaded.verify(task.checksum.as_ref()).unwrap_err();
        drop(downloaded);

        assert_eq!(err.kind(), "ChecksumError");
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn missing_source_is_a_network_error() {
        let tmp = tempfile::tempdir().unwrap();
        let task = DownloadTask {
            url: file_url(&tmp.path().join("absent.zip")),
            dest: tmp.path().join("absent.zip.out"),
            checksum: None,
        };
        let err = Fetcher::new(Duration::from_secs(30))
            .fetch(&task, None)
            .unwrap_err();
        assert_eq!(err.kind(), "NetworkError");
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("big.tar");
        fs::write(&src, vec![0u8; 1024]).unwrap();
        let task = DownloadTask {
            url: file_url(&src),
            dest: tmp.path().join("big.tar.out"),
            checksum: None,
        };
        let err = Fetcher::new(Duration::ZERO)
            .fetch(&task, None)
            .unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
    }

    #[test]
    fn unsupported_scheme_is_rejected_up_front() {
        let err = Fetcher::new(Duration::from_secs(1))
            .fetch_page("ftp://example.org/index.html")
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn archive_names() {
        assert_eq!(
            archive_name_from_url("https://x.org/dist/rust-1.2.0-x86_64-unknown-linux-gnu.tar.gz"),
            "rust-1.2.0-x86_64-unknown-linux-gnu.tar.gz"
        );
        assert_eq!(
            archive_name_from_url("https://x.org/product?code=IIC&latest"),
            "product"
        );
        assert_eq!(archive_name_from_url("https://x.org/"), "download");
    }
}
