//! Find-and-replace across globbed files
//!
//! Rules rewrite matched files in place. A rule whose pattern occurs in no
//! matched file is a no-op that logs a warning; a rule marked
//! [`ReplaceRule::required`] turns that case into an error. A glob that
//! matches no file at all is always an error.

use crate::error::{ReleaseError, ReleaseResult};
use regex::Regex;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

/// What to search for
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact text
    Literal(String),
    /// Regular expression; the replacement may use `$1`-style captures
    Regex(Regex),
}

impl Pattern {
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Literal(text) => text,
            Pattern::Regex(re) => re.as_str(),
        }
    }

    fn count(&self, content: &str) -> usize {
        match self {
            Pattern::Literal(text) if text.is_empty() => 0,
            Pattern::Literal(text) => content.matches(text.as_str()).count(),
            Pattern::Regex(re) => re.find_iter(content).count(),
        }
    }

    fn apply<'a>(&self, content: &'a str, replacement: &str) -> Cow<'a, str> {
        match self {
            Pattern::Literal(text) => Cow::Owned(content.replace(text.as_str(), replacement)),
            Pattern::Regex(re) => re.replace_all(content, replacement),
        }
    }
}

/// One replacement over a set of files
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pattern: Pattern,
    replacement: String,
    files: String,
    required: bool,
}

/// Outcome of applying a rule
#[derive(Debug, Clone, Default)]
pub struct ReplaceReport {
    /// Files the glob matched
    pub files_matched: usize,
    /// Files whose content changed
    pub files_changed: Vec<PathBuf>,
    /// Total pattern occurrences replaced
    pub occurrences: usize,
}

impl ReplaceReport {
    /// True when no file was modified
    pub fn is_noop(&self) -> bool {
        self.occurrences == 0
    }
}

impl ReplaceRule {
    /// Replace exact text in every file matching `files`
    pub fn literal(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        files: impl Into<String>,
    ) -> Self {
        Self {
            pattern: Pattern::Literal(pattern.into()),
            replacement: replacement.into(),
            files: files.into(),
            required: false,
        }
    }

    /// Replace regular expression matches in every file matching `files`
    pub fn regex(
        pattern: &str,
        replacement: impl Into<String>,
        files: impl Into<String>,
    ) -> ReleaseResult<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| ReleaseError::Pattern(format!("{}: {}", pattern, e)))?;
        Ok(Self {
            pattern: Pattern::Regex(re),
            replacement: replacement.into(),
            files: files.into(),
            required: false,
        })
    }

    /// Fail instead of warning when the pattern occurs nowhere
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn files(&self) -> &str {
        &self.files
    }

    /// Apply with `files` interpreted relative to `base`
    pub fn apply_in(&self, base: &Path) -> ReleaseResult<ReplaceReport> {
        let full = if Path::new(&self.files).is_absolute() {
            self.files.clone()
        } else {
            let escaped = glob::Pattern::escape(&base.to_string_lossy());
            format!("{}/{}", escaped.trim_end_matches('/'), self.files)
        };
        self.apply_glob(&full)
    }

    /// Apply with `files` interpreted as-is
    pub fn apply(&self) -> ReleaseResult<ReplaceReport> {
        self.apply_glob(&self.files)
    }

    fn apply_glob(&self, full_glob: &str) -> ReleaseResult<ReplaceReport> {
        let targets = matched_files(full_glob)?;
        if targets.is_empty() {
            return Err(ReleaseError::NoMatchingFiles(full_glob.to_string()));
        }

        let mut report = ReplaceReport {
            files_matched: targets.len(),
            ..Default::default()
        };

        for path in targets {
            let content = fs::read_to_string(&path)?;
            let count = self.pattern.count(&content);
            if count == 0 {
                tracing::trace!(path = %path.display(), "Pattern absent");
                continue;
            }
            let rewritten = self.pattern.apply(&content, &self.replacement);
            if rewritten.as_ref() != content.as_str() {
                fs::write(&path, rewritten.as_bytes())?;
                report.files_changed.push(path);
            }
            report.occurrences += count;
        }

        if report.is_noop() {
            if self.required {
                return Err(ReleaseError::PatternNotFound {
                    pattern: self.pattern.as_str().to_string(),
                    files: self.files.clone(),
                });
            }
            tracing::warn!(
                pattern = %self.pattern.as_str(),
                files = %self.files,
                matched = report.files_matched,
                "Replacement pattern not found in any target file"
            );
        } else {
            tracing::debug!(
                pattern = %self.pattern.as_str(),
                occurrences = report.occurrences,
                changed = report.files_changed.len(),
                "Applied replacement"
            );
        }

        Ok(report)
    }
}

/// Shorthand for a literal, non-required rule
pub fn replace(pattern: &str, replacement: &str, file_glob: &str) -> ReleaseResult<ReplaceReport> {
    ReplaceRule::literal(pattern, replacement, file_glob).apply()
}

fn matched_files(full_glob: &str) -> ReleaseResult<Vec<PathBuf>> {
    let paths =
        glob::glob(full_glob).map_err(|e| ReleaseError::Pattern(format!("{}: {}", full_glob, e)))?;
    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| ReleaseError::Io(e.into()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
