//! Typed descriptor of the server artifact
//!
//! Stages that patch the server bundle agree on exact placeholder text. The
//! descriptor names each placeholder as a slot, records which file holds it
//! and whether it has been filled, and persists alongside the artifact so a
//! later stage can check the contract before relying on it.

use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::replace::ReplaceRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Module linkage convention of a server file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// Import/export modules, top-level suspension allowed
    Esm,
    /// Single-file require modules, no top-level suspension
    Cjs,
}

/// Named placeholder positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Top-level suspending call in the request handler
    SuspendPoint,
    /// Private key expression in the server entry
    SslKey,
    /// Certificate expression in the server entry
    SslCert,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::SuspendPoint => "suspend_point",
            SlotKind::SslKey => "ssl_key",
            SlotKind::SslCert => "ssl_cert",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One placeholder: where it lives and whether it was filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// File holding the placeholder, relative to the project root
    pub file: PathBuf,
    /// Exact placeholder text
    pub text: String,
    #[serde(default)]
    pub applied: bool,
}

/// Descriptor persisted next to the server artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerArtifact {
    /// Current entry file, relative to the project root
    pub entry: PathBuf,
    pub format: ModuleFormat,
    #[serde(default)]
    pub slots: BTreeMap<SlotKind, Slot>,
}

impl ServerArtifact {
    pub fn new(entry: impl Into<PathBuf>, format: ModuleFormat) -> Self {
        Self {
            entry: entry.into(),
            format,
            slots: BTreeMap::new(),
        }
    }

    /// Declare a slot
    pub fn with_slot(
        mut self,
        kind: SlotKind,
        file: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> Self {
        self.slots.insert(
            kind,
            Slot {
                file: file.into(),
                text: text.into(),
                applied: false,
            },
        );
        self
    }

    pub fn slot(&self, kind: SlotKind) -> Option<&Slot> {
        self.slots.get(&kind)
    }

    pub fn is_filled(&self, kind: SlotKind) -> bool {
        self.slot(kind).map(|s| s.applied).unwrap_or(false)
    }

    /// Slots still waiting for a value
    pub fn unfilled(&self) -> Vec<SlotKind> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.applied)
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Load the descriptor written by an earlier stage
    pub fn load(layout: &ProjectLayout) -> ReleaseResult<Self> {
        let path = layout.artifact_descriptor();
        if !path.exists() {
            return Err(ReleaseError::MissingArtifact(path));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, layout: &ProjectLayout) -> ReleaseResult<()> {
        let path = layout.artifact_descriptor();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check every unfilled slot's text is present in its file
    pub fn verify(&self, root: &Path) -> ReleaseResult<()> {
        for (kind, slot) in self.slots.iter().filter(|(_, s)| !s.applied) {
            let path = root.join(&slot.file);
            if !path.exists() {
                return Err(ReleaseError::MissingArtifact(path));
            }
            let content = fs::read_to_string(&path)?;
            if !content.contains(&slot.text) {
                return Err(ReleaseError::BrokenContract {
                    slot: kind.to_string(),
                    file: path,
                });
            }
        }
        Ok(())
    }

    /// Replace a slot's placeholder text
    ///
    /// Returns `false` when the slot was already filled. A missing
    /// placeholder is an error.
    pub fn fill(&mut self, root: &Path, kind: SlotKind, replacement: &str) -> ReleaseResult<bool> {
        let slot = self.slots.get_mut(&kind).ok_or_else(|| {
            ReleaseError::Config(format!("Server artifact has no '{}' slot", kind))
        })?;
        if slot.applied {
            tracing::debug!(slot = %kind, "Slot already filled");
            return Ok(false);
        }

        let file = slot.file.to_string_lossy().replace('\\', "/");
        let rule =
            ReplaceRule::literal(slot.text.clone(), replacement, glob::Pattern::escape(&file))
                .required();
        rule.apply_in(root).map_err(|e| match e {
            ReleaseError::PatternNotFound { .. } => ReleaseError::BrokenContract {
                slot: kind.to_string(),
                file: root.join(&slot.file),
            },
            other => other,
        })?;

        slot.applied = true;
        tracing::debug!(slot = %kind, file = %slot.file.display(), "Filled slot");
        Ok(true)
    }

    /// Point slots at a freshly emitted file, resetting their state
    pub fn relocate(&mut self, kinds: &[SlotKind], file: &Path) {
        for kind in kinds {
            if let Some(slot) = self.slots.get_mut(kind) {
                slot.file = file.to_path_buf();
                slot.applied = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ServerArtifact {
        ServerArtifact::new("build/serve.js", ModuleFormat::Esm)
            .with_slot(SlotKind::SslKey, "build/serve.js", "process.env.SSLKEY")
    }

    #[test]
    fn test_fill_then_skip() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("build")).unwrap();
        fs::write(temp.path().join("build/serve.js"), "const k = process.env.SSLKEY;").unwrap();

        let mut artifact = sample();
        assert!(artifact.fill(temp.path(), SlotKind::SslKey, "KEY").unwrap());
        assert!(artifact.is_filled(SlotKind::SslKey));
        assert!(!artifact.fill(temp.path(), SlotKind::SslKey, "KEY").unwrap());
        assert_eq!(
            fs::read_to_string(temp.path().join("build/serve.js")).unwrap(),
            "const k = KEY;"
        );
    }

    #[test]
    fn test_verify_reports_broken_contract() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("build")).unwrap();
        fs::write(temp.path().join("build/serve.js"), "const k = readKey();").unwrap();

        let artifact = sample();
        assert!(matches!(
            artifact.verify(temp.path()),
            Err(ReleaseError::BrokenContract { .. })
        ));
    }

    #[test]
    fn test_relocate_resets_applied() {
        let mut artifact = sample();
        artifact.slots.get_mut(&SlotKind::SslKey).unwrap().applied = true;
        artifact.relocate(&[SlotKind::SslKey], Path::new("dist/server/index.cjs"));
        let slot = artifact.slot(SlotKind::SslKey).unwrap();
        assert!(!slot.applied);
        assert_eq!(slot.file, PathBuf::from("dist/server/index.cjs"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["format"], "esm");
        assert_eq!(json["slots"]["ssl_key"]["text"], "process.env.SSLKEY");
    }
}
