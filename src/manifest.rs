//! Desktop manifest (`nw/package.json`)
//!
//! The manifest starts from the project's own `package.json` identity and,
//! when desktop scripts are present, names their entry as `node-main`. It is
//! then deep-merged with the `[desktop.manifest]` table from `release.toml`, gets
//! build metadata, and finally lists the local API certificate under
//! `additional_trust_anchors` so the desktop shell accepts it without a
//! warning.

use crate::error::{ReleaseError, ReleaseResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Manifest key read by the desktop runtime for implicitly trusted certificates
pub const TRUST_ANCHORS_KEY: &str = "additional_trust_anchors";

/// Manifest key naming the desktop-context entry script
pub const NODE_MAIN_KEY: &str = "node-main";

/// Identity fields read from the project's `package.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl ProjectMetadata {
    /// Load from a `package.json` file
    pub fn from_package_json(path: impl AsRef<Path>) -> ReleaseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReleaseError::MissingArtifact(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ReleaseError::Config(format!("Invalid {}: {}", path.display(), e))
        })
    }
}

/// Desktop runtime manifest under construction
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopManifest {
    fields: Map<String, Value>,
}

impl DesktopManifest {
    pub fn new(metadata: &ProjectMetadata) -> Self {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(metadata.name.clone()));
        fields.insert("version".into(), Value::String(metadata.version.clone()));
        fields.insert("main".into(), Value::String("index.html".into()));
        if let Some(ref description) = metadata.description {
            fields.insert("description".into(), Value::String(description.clone()));
        }
        Self { fields }
    }

    /// Deep-merge `overrides`; nested objects merge, everything else replaces
    pub fn merge(mut self, overrides: &Map<String, Value>) -> Self {
        merge_into(&mut self.fields, overrides);
        self
    }

    /// Script the runtime runs in the Node context before the window opens
    pub fn with_node_main(mut self, script: &str) -> Self {
        self.fields
            .insert(NODE_MAIN_KEY.into(), Value::String(script.to_string()));
        self
    }

    /// Record which tool produced the manifest and for which target
    pub fn with_build_metadata(mut self, platform: &str, arch: &str) -> Self {
        self.fields.insert(
            "build".into(),
            json!({
                "tool": env!("CARGO_PKG_NAME"),
                "toolVersion": crate::VERSION,
                "platform": platform,
                "arch": arch,
            }),
        );
        self
    }

    /// Add a PEM certificate to the trust anchor list, once
    pub fn with_trust_anchor(mut self, pem: &str) -> Self {
        let entry = self
            .fields
            .entry(TRUST_ANCHORS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(anchors) = entry {
            if !anchors.iter().any(|a| a.as_str() == Some(pem)) {
                anchors.push(Value::String(pem.to_string()));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn trust_anchors(&self) -> Vec<&str> {
        self.fields
            .get(TRUST_ANCHORS_KEY)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> ReleaseResult<String> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> ReleaseResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        tracing::debug!(path = %path.display(), "Wrote desktop manifest");
        Ok(())
    }
}

fn merge_into(target: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_nested() {
        let mut base = Map::new();
        base.insert("window".into(), json!({"width": 800, "title": "a"}));
        let overrides = json!({"window": {"width": 1280}, "chromium-args": "--x"});
        merge_into(&mut base, overrides.as_object().unwrap());
        assert_eq!(base["window"], json!({"width": 1280, "title": "a"}));
        assert_eq!(base["chromium-args"], "--x");
    }
}
