//! Static and service bundle producers
//!
//! Both run the frontend bundler; they differ only in the variant flag set
//! on the child environment and in the artifact checked afterwards.

use crate::config::{BuildVariant, ToolsConfig};
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::process::{ToolCommand, ToolRunner};
use std::path::PathBuf;

/// Runs the frontend bundler for one variant
pub struct FrontendBuilder<'a> {
    tools: &'a ToolsConfig,
    layout: &'a ProjectLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> FrontendBuilder<'a> {
    pub fn new(
        tools: &'a ToolsConfig,
        layout: &'a ProjectLayout,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            tools,
            layout,
            runner,
        }
    }

    /// Build and return the artifact that proves the variant was produced
    pub fn build(&self, variant: BuildVariant) -> ReleaseResult<PathBuf> {
        tracing::info!(variant = variant.name(), "Running vite build");

        let (flag, value) = variant.env_flag();
        let command = ToolCommand::new(format!("vite ({})", variant.name()), &self.tools.vite)?
            .arg("build")
            .current_dir(self.layout.root())
            .env(flag, value)
            .timeout(self.tools.timeout());
        self.runner.run(&command)?;

        let expected = match variant {
            BuildVariant::Static => self.layout.static_index(),
            BuildVariant::Api => self.layout.handler_file(),
        };
        if !expected.exists() {
            return Err(ReleaseError::MissingArtifact(expected));
        }

        tracing::info!(variant = variant.name(), "Vite build succeeded");
        Ok(expected)
    }
}
