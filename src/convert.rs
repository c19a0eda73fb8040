//! Module format conversion (ESM server build → single CommonJS file)
//!
//! 1. Patch the handler's top-level suspend point into a plain call
//! 2. Bundle the server entry into one file, leaving platform modules external
//! 3. Restore module specifiers the bundler split into concatenated pieces
//! 4. Move the bundle to its final name and mark the directory as CommonJS

use crate::artifact::{ModuleFormat, ServerArtifact, SlotKind};
use crate::config::{ApiConfig, ToolsConfig};
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::process::{ToolCommand, ToolRunner};
use crate::replace::ReplaceRule;
use std::fs;
use std::path::PathBuf;

/// Platform modules resolved at runtime instead of inlined
pub const PLATFORM_MODULES: [&str; 9] = [
    "fs",
    "path",
    "url",
    "stream",
    "buffer",
    "crypto",
    "http",
    "https",
    "querystring",
];

/// `require("./a" + "b")` or `import("./a" + "b")`
const SPLIT_SPECIFIER: &str = r#"\b(import|require)\(\s*"([^"]*)"\s*\+\s*"([^"]*)"\s*\)"#;
const JOINED_SPECIFIER: &str = r#"${1}("${2}${3}")"#;

/// Converts the server build into a single CommonJS file
pub struct ModuleConverter<'a> {
    api: &'a ApiConfig,
    tools: &'a ToolsConfig,
    layout: &'a ProjectLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> ModuleConverter<'a> {
    pub fn new(
        api: &'a ApiConfig,
        tools: &'a ToolsConfig,
        layout: &'a ProjectLayout,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            api,
            tools,
            layout,
            runner,
        }
    }

    /// Run the conversion and update the descriptor in place
    pub fn convert(&self, artifact: &mut ServerArtifact) -> ReleaseResult<PathBuf> {
        let root = self.layout.root();
        artifact.verify(root)?;

        if artifact.fill(root, SlotKind::SuspendPoint, &self.api.resumed_call)? {
            tracing::info!("Removed top-level suspend point from handler");
        }

        let bundle = self.layout.server_bundle();
        fs::create_dir_all(self.layout.server_dir())?;
        if bundle.exists() {
            fs::remove_file(&bundle)?;
        }

        let command = ToolCommand::new("esbuild", &self.tools.esbuild)?
            .arg(self.layout.server_entry().to_string_lossy().into_owned())
            .args(["--bundle", "--platform=node", "--format=cjs"])
            .arg(format!("--outfile={}", bundle.display()))
            .args(PLATFORM_MODULES.iter().map(|m| format!("--external:{}", m)))
            .current_dir(root)
            .timeout(self.tools.timeout());
        self.runner.run(&command)?;

        if !bundle.exists() {
            return Err(ReleaseError::MissingArtifact(bundle));
        }

        let bundle_glob = glob::Pattern::escape(&bundle.to_string_lossy());
        let report = ReplaceRule::regex(SPLIT_SPECIFIER, JOINED_SPECIFIER, bundle_glob)?.apply()?;
        if !report.is_noop() {
            tracing::info!(occurrences = report.occurrences, "Restored literal module specifiers");
        }

        let output = self.layout.server_file();
        fs::rename(&bundle, &output)?;
        fs::write(
            self.layout.server_dir().join("package.json"),
            serde_json::to_string_pretty(&serde_json::json!({ "type": "commonjs" }))?,
        )?;

        let content = fs::read_to_string(&output)?;
        if content.contains(&self.api.suspend_point) {
            return Err(ReleaseError::BrokenContract {
                slot: SlotKind::SuspendPoint.to_string(),
                file: output,
            });
        }

        let relative = self.layout.relative(&output).to_path_buf();
        artifact.entry = relative.clone();
        artifact.format = ModuleFormat::Cjs;
        artifact.relocate(&[SlotKind::SslKey, SlotKind::SslCert], &relative);
        artifact.verify(root)?;
        artifact.save(self.layout)?;

        tracing::info!(path = %output.display(), "Server converted to CommonJS");
        Ok(output)
    }
}
