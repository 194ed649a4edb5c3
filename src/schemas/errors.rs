//! # Installer error taxonomy
//!
//! Every step of an installation reports failures through [`InstallError`]. The
//! interactive channel has its own, smaller [`ProtocolError`]: a wrong answer is local to
//! the question being asked and never aborts a run on its own.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal installation failures. Each variant ends the state machine in `Error(kind)`.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Pre-flight configuration problems: unmapped or unsupported architecture,
    /// malformed descriptor, unknown framework.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreachable host, non-success HTTP status, or a download page without a usable link.
    #[error("network error: {0}")]
    Network(String),

    /// The downloaded bytes do not match the published digest. The download is discarded.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    Checksum {
        url: String,
        expected: String,
        actual: String,
    },

    /// Corrupt archive, unsupported format, ambiguous strip pattern or occupied destination.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The upstream archive no longer has the layout we expect.
    #[error("unexpected layout in {}: expected '{expected}', found [{}]", dir.display(), found.join(", "))]
    Layout {
        dir: PathBuf,
        expected: String,
        found: Vec<String>,
    },

    /// An interaction or a long-running operation ran past its deadline.
    #[error("timed out after {}s while {during}", limit.as_secs())]
    Timeout { during: String, limit: Duration },

    /// The user refused a license agreement.
    #[error("license for {0} was not accepted")]
    LicenseDeclined(String),

    /// The channel was driven out of order (only reachable through a driver bug).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// Wraps an `io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        InstallError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, stable name of the error family. Used in logs and state history.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::Config(_) => "ConfigError",
            InstallError::Network(_) => "NetworkError",
            InstallError::Checksum { .. } => "ChecksumError",
            InstallError::Extraction(_) => "ExtractionError",
            InstallError::Layout { .. } => "LayoutError",
            InstallError::Timeout { .. } => "TimeoutError",
            InstallError::LicenseDeclined(_) => "LicenseDeclined",
            InstallError::Protocol(_) => "ProtocolError",
            InstallError::Io { .. } => "IoError",
        }
    }
}

/// Errors raised by the question/answer channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The answer does not fit the grammar of the outstanding question.
    #[error("invalid answer '{answer}': expected {expected}")]
    InvalidAnswer { answer: String, expected: String },

    /// An answer arrived while no question was outstanding.
    #[error("no question is awaiting an answer")]
    NotAwaiting,

    /// A question was presented while another one was still unanswered.
    #[error("a question is already awaiting an answer")]
    AlreadyAwaiting,

    /// The conversation already ended.
    #[error("the session is already finished")]
    Finished,

    /// The driver has no more answers to give (input closed or script exhausted).
    #[error("the driver closed its input")]
    DriverClosed,
}
