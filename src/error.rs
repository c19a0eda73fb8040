//! Error types for nw-release

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for release operations
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Errors that can occur while running the release pipeline
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stage name not in the fixed stage table
    #[error("Unknown stage '{0}' (expected one of: static, prebuild, nw, api, esmtocjs, obfuscate, ssl, cjstoexe, all)")]
    UnknownStage(String),

    /// An artifact a stage depends on is missing
    #[error("Expected artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// A glob that must match at least one file matched nothing
    #[error("No files matched: {0}")]
    NoMatchingFiles(String),

    /// A required replacement pattern did not occur in any target file
    #[error("Pattern {pattern:?} not found in files matching {files}")]
    PatternNotFound { pattern: String, files: String },

    /// Placeholder text expected by a later stage is gone
    #[error("Broken artifact contract: slot '{slot}' text not found in {file}")]
    BrokenContract { slot: String, file: PathBuf },

    /// Download error
    #[error("Network error: {0}")]
    Network(String),

    /// Archive extraction error
    #[error("Archive error: {0}")]
    Archive(String),

    /// External tool exited unsuccessfully
    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    Subprocess {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// External tool exceeded its time budget
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob or regular expression
    #[error("Invalid pattern: {0}")]
    Pattern(String),
}

/// Coarse error categories reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    FileSystem,
    Network,
    Subprocess,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::FileSystem => "filesystem",
            ErrorKind::Network => "network",
            ErrorKind::Subprocess => "subprocess",
        }
    }
}

impl ReleaseError {
    /// Map the error onto its reporting category
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::Config(_)
            | ReleaseError::UnknownStage(_)
            | ReleaseError::Toml(_)
            | ReleaseError::Pattern(_) => ErrorKind::Configuration,
            ReleaseError::Io(_)
            | ReleaseError::MissingArtifact(_)
            | ReleaseError::NoMatchingFiles(_)
            | ReleaseError::PatternNotFound { .. }
            | ReleaseError::BrokenContract { .. }
            | ReleaseError::Archive(_)
            | ReleaseError::Json(_) => ErrorKind::FileSystem,
            ReleaseError::Network(_) => ErrorKind::Network,
            ReleaseError::Subprocess { .. } | ReleaseError::Timeout { .. } => {
                ErrorKind::Subprocess
            }
        }
    }
}
