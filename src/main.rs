use clap::Parser;
use console::style;
use nw_release::{Pipeline, ReleaseConfig, ReleaseError, ReleaseStages, Stage};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "NW_RELEASE_LOG";

/// Release pipeline for NW.js desktop bundles with a local HTTPS API
#[derive(Parser, Debug)]
#[command(name = "nw-release", version, about)]
struct Cli {
    /// Stage to run: static, prebuild, nw, api, esmtocjs, obfuscate, ssl, cjstoexe or all
    stage: String,

    /// Project root
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Configuration file (defaults to release.toml in the project root)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Never download anything
    #[arg(long, env = "RELEASE_OFFLINE")]
    offline: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default.into()),
        _ => default.into(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<(), ReleaseError> {
    let stage: Stage = cli.stage.parse()?;

    let mut config = ReleaseConfig::load(&cli.project, cli.config.as_deref())?;
    if cli.offline {
        config.offline = true;
    }

    let mut pipeline = Pipeline::new(ReleaseStages::new(config));
    let report = pipeline.run(stage)?;

    println!(
        "{} {} stage(s) completed in {:.1}s",
        style("✓").green().bold(),
        report.completed.len(),
        report.total().as_secs_f64()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{} [{}] {}",
                style("error:").red().bold(),
                e.kind().as_str(),
                e
            );
            match e {
                ReleaseError::UnknownStage(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
