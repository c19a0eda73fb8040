//! Stage orchestration
//!
//! [`Pipeline`] expands the requested stage, runs each concrete stage in
//! order and stops at the first failure. Artifacts written by earlier stages
//! are left in place; nothing is rolled back.

use crate::artifact::ServerArtifact;
use crate::certificate::CertificateManager;
use crate::config::{BuildVariant, ReleaseConfig};
use crate::convert::ModuleConverter;
use crate::desktop::{self, DesktopPackager};
use crate::downloader::{ArchiveSource, Downloader};
use crate::error::ReleaseResult;
use crate::executable::ExecutablePackager;
use crate::frontend::FrontendBuilder;
use crate::inject;
use crate::layout::ProjectLayout;
use crate::obfuscate;
use crate::process::{SystemRunner, ToolRunner};
use crate::progress::{ProgressExt, StageProgress};
use crate::service;
use crate::stage::Stage;
use std::time::{Duration, Instant};

/// Executes one concrete stage
pub trait StageHandler {
    fn run_stage(&mut self, stage: Stage) -> ReleaseResult<()>;
}

/// Stages that completed, in order, with their durations
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub completed: Vec<(Stage, Duration)>,
}

impl PipelineReport {
    pub fn stages(&self) -> Vec<Stage> {
        self.completed.iter().map(|(stage, _)| *stage).collect()
    }

    pub fn total(&self) -> Duration {
        self.completed.iter().map(|(_, d)| *d).sum()
    }
}

/// Linear, fail-fast stage runner
pub struct Pipeline<H> {
    handler: H,
    progress: StageProgress,
}

impl<H: StageHandler> Pipeline<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            progress: StageProgress::new(),
        }
    }

    /// Suppress spinners (tests, non-interactive runs)
    pub fn hidden_progress(mut self) -> Self {
        self.progress = StageProgress::hidden();
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Run `stage`, expanding `all` into the full sequence
    pub fn run(&mut self, stage: Stage) -> ReleaseResult<PipelineReport> {
        let mut report = PipelineReport::default();

        for step in stage.expand() {
            let pb = self
                .progress
                .stage(&format!("{}: {}...", step, step.description()));
            tracing::info!(stage = %step, "Starting stage");
            let started = Instant::now();

            match self.handler.run_stage(step) {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    pb.finish_success(&format!("{} ({:.1}s)", step, elapsed.as_secs_f64()));
                    tracing::info!(
                        stage = %step,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Stage finished"
                    );
                    report.completed.push((step, elapsed));
                }
                Err(e) => {
                    pb.finish_error(&format!("{}: {}", step, e));
                    tracing::error!(stage = %step, kind = e.kind().as_str(), "Stage failed: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(report)
    }
}

/// The real stage implementations
pub struct ReleaseStages {
    config: ReleaseConfig,
    layout: ProjectLayout,
    runner: Box<dyn ToolRunner>,
    archives: Box<dyn ArchiveSource>,
}

impl ReleaseStages {
    /// System processes and network downloads
    pub fn new(config: ReleaseConfig) -> Self {
        let downloader = Downloader::new().offline(config.offline);
        Self::with_backends(config, Box::new(SystemRunner::new()), Box::new(downloader))
    }

    pub fn with_backends(
        config: ReleaseConfig,
        runner: Box<dyn ToolRunner>,
        archives: Box<dyn ArchiveSource>,
    ) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            runner,
            archives,
        }
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    fn certificates(&self) -> CertificateManager<'_> {
        CertificateManager::new(
            &self.config.certificate,
            &self.layout,
            self.archives.as_ref(),
            self.runner.as_ref(),
        )
        .timeout(self.config.tools.timeout())
    }

    fn obfuscate(&self) -> ReleaseResult<()> {
        let mut artifact = ServerArtifact::load(&self.layout)?;
        let material = self.certificates().load()?;
        let tokens = obfuscate::tokens(&self.config.secrets)?;

        let report = inject::inject(&self.layout, &mut artifact, &tokens, &material)?;
        for name in &report.secrets_missing {
            tracing::warn!(secret = %name, "Secret not found in server bundle");
        }
        Ok(())
    }
}

impl StageHandler for ReleaseStages {
    fn run_stage(&mut self, stage: Stage) -> ReleaseResult<()> {
        let config = &self.config;
        let layout = &self.layout;
        let runner = self.runner.as_ref();

        match stage {
            Stage::Static => {
                FrontendBuilder::new(&config.tools, layout, runner).build(BuildVariant::Static)?;
            }
            Stage::Prebuild => {
                let material = self.certificates().load()?;
                desktop::prebuild(&config.desktop, layout, &material)?;
            }
            Stage::Nw => {
                DesktopPackager::new(&config.desktop, &config.tools, layout, runner).package()?;
            }
            Stage::Api => {
                service::produce(config, layout, runner)?;
            }
            Stage::EsmToCjs => {
                let mut artifact = ServerArtifact::load(layout)?;
                ModuleConverter::new(&config.api, &config.tools, layout, runner)
                    .convert(&mut artifact)?;
            }
            Stage::Obfuscate => self.obfuscate()?,
            Stage::Ssl => {
                let material = self.certificates().ensure()?;
                tracing::info!(provenance = material.provenance().as_str(), "Certificate ready");
            }
            Stage::CjsToExe => {
                let artifact = ServerArtifact::load(layout)?;
                ExecutablePackager::new(&config.executable, &config.tools, layout, runner)
                    .package(&artifact)?;
            }
            Stage::All => {
                for step in Stage::SEQUENCE {
                    self.run_stage(step)?;
                }
            }
        }
        Ok(())
    }
}
