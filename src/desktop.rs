//! Desktop runtime packaging
//!
//! `prebuild` assembles the desktop source directory from the static bundle,
//! the desktop-context scripts and a generated manifest. `nw` hands that
//! directory to the desktop packager.

use crate::certificate::CertificateMaterial;
use crate::config::{DesktopConfig, ToolsConfig};
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::manifest::{DesktopManifest, ProjectMetadata};
use crate::process::{ToolCommand, ToolRunner};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Directory inside `nw/` holding the desktop-context scripts
const SCRIPTS_SUBDIR: &str = "nw";

/// Copy every file under `src` into `dest`, keeping relative paths
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> ReleaseResult<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| ReleaseError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ReleaseError::Config(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Assemble `nw/` and return the manifest written into it
pub fn prebuild(
    desktop: &DesktopConfig,
    layout: &ProjectLayout,
    material: &CertificateMaterial,
) -> ReleaseResult<DesktopManifest> {
    let build_dir = layout.build_dir();
    if !layout.static_index().exists() {
        return Err(ReleaseError::MissingArtifact(layout.static_index()));
    }

    let target = layout.desktop_src();
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    let files = copy_tree(&build_dir, &target)?;
    tracing::info!(files, dest = %target.display(), "Copied static bundle");

    let mut node_main = None;
    let scripts = layout.resolve(&desktop.scripts_dir);
    if scripts.is_dir() {
        let count = copy_tree(&scripts, &target.join(SCRIPTS_SUBDIR))?;
        tracing::info!(files = count, "Copied desktop scripts");
        if scripts.join(&desktop.scripts_entry).is_file() {
            node_main = Some(format!("{}/{}", SCRIPTS_SUBDIR, desktop.scripts_entry));
        } else {
            tracing::warn!(
                entry = %desktop.scripts_entry,
                "Desktop scripts copied without an entry script"
            );
        }
    } else {
        tracing::debug!(path = %scripts.display(), "No desktop scripts directory");
    }

    let metadata = ProjectMetadata::from_package_json(layout.package_json())?;
    let platform = desktop.platform.resolve();
    let mut manifest = DesktopManifest::new(&metadata);
    if let Some(ref script) = node_main {
        manifest = manifest.with_node_main(script);
    }
    let manifest = manifest
        .merge(&desktop.manifest)
        .with_build_metadata(platform.nw_name(), desktop.arch.as_str())
        .with_trust_anchor(material.trust_anchor());
    manifest.write(target.join("package.json"))?;

    Ok(manifest)
}

/// Runs the desktop runtime packager over `nw/`
pub struct DesktopPackager<'a> {
    desktop: &'a DesktopConfig,
    tools: &'a ToolsConfig,
    layout: &'a ProjectLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> DesktopPackager<'a> {
    pub fn new(
        desktop: &'a DesktopConfig,
        tools: &'a ToolsConfig,
        layout: &'a ProjectLayout,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            desktop,
            tools,
            layout,
            runner,
        }
    }

    pub fn command(&self) -> ReleaseResult<ToolCommand> {
        let platform = self.desktop.platform.resolve();
        Ok(ToolCommand::new("nwbuild", &self.tools.nwbuild)?
            .args([
                "--mode=build".to_string(),
                format!("--version={}", self.desktop.version),
                format!("--flavor={}", self.desktop.flavor),
                format!("--platform={}", platform.nw_name()),
                format!("--arch={}", self.desktop.arch.as_str()),
                format!("--srcDir={}", self.layout.desktop_src().display()),
                format!("--outDir={}", self.layout.desktop_out().display()),
                "--glob=false".to_string(),
            ])
            .current_dir(self.layout.root())
            .timeout(self.tools.timeout()))
    }

    /// Package the desktop image and return its output directory
    pub fn package(&self) -> ReleaseResult<std::path::PathBuf> {
        let manifest = self.layout.desktop_src().join("package.json");
        if !manifest.exists() {
            return Err(ReleaseError::MissingArtifact(manifest));
        }

        self.runner.run(&self.command()?)?;

        let out = self.layout.desktop_out();
        let produced = out.is_dir() && fs::read_dir(&out)?.next().is_some();
        if !produced {
            return Err(ReleaseError::MissingArtifact(out));
        }
        tracing::info!(path = %out.display(), "Desktop image packaged");
        Ok(out)
    }
}
