//! Native executable packaging of the converted server

use crate::artifact::{ModuleFormat, ServerArtifact, SlotKind};
use crate::config::{ExecutableConfig, ToolsConfig};
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::process::{ToolCommand, ToolRunner};
use std::path::PathBuf;

/// Runs the native packager over the single-file server
pub struct ExecutablePackager<'a> {
    executable: &'a ExecutableConfig,
    tools: &'a ToolsConfig,
    layout: &'a ProjectLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> ExecutablePackager<'a> {
    pub fn new(
        executable: &'a ExecutableConfig,
        tools: &'a ToolsConfig,
        layout: &'a ProjectLayout,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            executable,
            tools,
            layout,
            runner,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.layout
            .executable(&self.executable.output_name, self.executable.platform)
    }

    /// The server must be CommonJS with its certificate slots filled
    pub fn check_ready(&self, artifact: &ServerArtifact) -> ReleaseResult<PathBuf> {
        let entry = self.layout.resolve(&artifact.entry);
        if artifact.format != ModuleFormat::Cjs {
            return Err(ReleaseError::Config(format!(
                "Server entry {} has not been converted to CommonJS",
                entry.display()
            )));
        }
        for kind in [SlotKind::SslKey, SlotKind::SslCert] {
            if !artifact.is_filled(kind) {
                return Err(ReleaseError::BrokenContract {
                    slot: kind.to_string(),
                    file: entry,
                });
            }
        }
        if !entry.exists() {
            return Err(ReleaseError::MissingArtifact(entry));
        }
        Ok(entry)
    }

    /// Package and return the executable path
    pub fn package(&self, artifact: &ServerArtifact) -> ReleaseResult<PathBuf> {
        let entry = self.check_ready(artifact)?;
        let output = self.output_path();
        let target = self.executable.target_triple();

        tracing::info!(target = %target, "Packaging native executable");
        let command = ToolCommand::new("pkg", &self.tools.pkg)?
            .arg(entry.to_string_lossy().into_owned())
            .args(["--targets".to_string(), target])
            .args(["--output".to_string(), output.to_string_lossy().into_owned()])
            .current_dir(self.layout.root())
            .timeout(self.tools.timeout());
        self.runner.run(&command)?;

        if !output.exists() {
            return Err(ReleaseError::MissingArtifact(output));
        }
        tracing::info!(path = %output.display(), "Native executable written");
        Ok(output)
    }
}
