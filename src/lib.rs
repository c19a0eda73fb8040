//! nw-release - Release pipeline for NW.js desktop apps with a local HTTPS API
//!
//! The pipeline turns a web application into two deliverables placed side by
//! side: a desktop image wrapping the static bundle, and a native executable
//! serving the application's API over HTTPS on localhost.
//!
//! # Stages
//!
//! | Stage       | Action                                                       |
//! |-------------|--------------------------------------------------------------|
//! | `ssl`       | Reuse or generate the self-signed certificate                |
//! | `static`    | Build the browser bundle into `build/`                       |
//! | `prebuild`  | Assemble `nw/` with a manifest trusting the certificate      |
//! | `nw`        | Package the desktop image into `dist/desktop/`               |
//! | `api`       | Build the server bundle and its HTTPS entry                  |
//! | `esmtocjs`  | Convert the server into `dist/server/index.cjs`              |
//! | `obfuscate` | Hide secret values and inject the certificate                |
//! | `cjstoexe`  | Package the server into a native executable                  |
//! | `all`       | All of the above, in this order                              |
//!
//! Stages run strictly one after another and the first failure aborts the
//! run. Nothing is rolled back.
//!
//! # Configuration
//!
//! ```toml
//! # release.toml
//! [api]
//! port = 5174
//!
//! [desktop]
//! platform = "windows"
//! arch = "x64"
//! version = "0.92.0"
//!
//! [desktop.manifest]
//! window = { width = 1280, height = 720 }
//!
//! [executable]
//! node = "node18"
//! output_name = "api"
//!
//! [secrets]
//! names = ["API_TOKEN"]
//! ```
//!
//! Secret values come from `.env` or the process environment, never from
//! the file itself.
//!
//! # Security
//!
//! Secret obfuscation only defeats static string scanning of the shipped
//! executable. Anyone able to run the executable, or to evaluate the
//! emitted expressions, recovers the values. Digits, uppercase letters and
//! punctuation are emitted as plain quoted characters; see
//! [`SecretToken::uncovered_chars`].

mod artifact;
mod certificate;
mod config;
mod convert;
pub mod desktop;
mod downloader;
mod error;
mod executable;
mod frontend;
pub mod inject;
mod layout;
mod manifest;
pub mod obfuscate;
mod pipeline;
pub mod process;
pub mod progress;
pub mod replace;
pub mod service;
mod stage;

pub use artifact::{ModuleFormat, ServerArtifact, Slot, SlotKind};
pub use certificate::{CertificateManager, CertificateMaterial, Provenance};
pub use config::{
    ApiConfig, Arch, BuildVariant, CertificateConfig, DesktopConfig, Environment,
    ExecutableConfig, Platform, ReleaseConfig, SecretsConfig, SuppliedCertificate, ToolsConfig,
    CONFIG_FILE_NAME, ENV_OFFLINE, ENV_SSL_CERT, ENV_SSL_KEY,
};
pub use convert::{ModuleConverter, PLATFORM_MODULES};
pub use desktop::DesktopPackager;
pub use downloader::{ArchiveSource, Downloader};
pub use error::{ErrorKind, ReleaseError, ReleaseResult};
pub use executable::ExecutablePackager;
pub use frontend::FrontendBuilder;
pub use inject::InjectReport;
pub use layout::ProjectLayout;
pub use manifest::{DesktopManifest, ProjectMetadata, NODE_MAIN_KEY, TRUST_ANCHORS_KEY};
pub use obfuscate::{obfuscate, SecretToken};
pub use pipeline::{Pipeline, PipelineReport, ReleaseStages, StageHandler};
pub use process::{SystemRunner, ToolCommand, ToolOutput, ToolRunner};
pub use replace::{replace, ReplaceReport, ReplaceRule};
pub use stage::Stage;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
