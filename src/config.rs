//! Release configuration types
//!
//! A [`ReleaseConfig`] is assembled once at process start from an optional
//! `release.toml` plus environment values, then passed by reference into
//! every stage. Nothing reads process-wide toggles after that point.

use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default manifest file name looked up in the project root
pub const CONFIG_FILE_NAME: &str = "release.toml";

/// Environment variable carrying a base64 PEM private key
pub const ENV_SSL_KEY: &str = "RELEASE_SSL_KEY";

/// Environment variable carrying a base64 PEM certificate
pub const ENV_SSL_CERT: &str = "RELEASE_SSL_CERT";

/// Environment variable that disables network downloads
pub const ENV_OFFLINE: &str = "RELEASE_OFFLINE";

// ============================================================================
// Build variant
// ============================================================================

/// Which configuration the frontend bundler builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildVariant {
    /// Browser bundle served from the desktop shell
    Static,
    /// Server bundle exposed through the local HTTPS API
    Api,
}

impl BuildVariant {
    /// Variant name for logs
    pub fn name(&self) -> &'static str {
        match self {
            BuildVariant::Static => "static",
            BuildVariant::Api => "api",
        }
    }

    /// Environment flag the bundler configuration reads to select adapter and routes
    pub fn env_flag(&self) -> (&'static str, &'static str) {
        match self {
            BuildVariant::Static => ("NWJS_BUILD_STATIC", "1"),
            BuildVariant::Api => ("NWJS_BUILD_API", "1"),
        }
    }
}

// ============================================================================
// Target platform
// ============================================================================

/// Target operating system for packaged outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Platform of the machine running the pipeline
    #[default]
    Current,
    Windows,
    MacOS,
    Linux,
}

impl Platform {
    /// Resolve `Current` to a concrete platform
    pub fn resolve(self) -> Self {
        match self {
            Platform::Current if cfg!(target_os = "windows") => Platform::Windows,
            Platform::Current if cfg!(target_os = "macos") => Platform::MacOS,
            Platform::Current => Platform::Linux,
            other => other,
        }
    }

    /// Platform name understood by nw-builder
    pub fn nw_name(self) -> &'static str {
        match self.resolve() {
            Platform::Windows => "win",
            Platform::MacOS => "osx",
            _ => "linux",
        }
    }

    /// Platform name used in pkg target triples
    pub fn pkg_name(self) -> &'static str {
        match self.resolve() {
            Platform::Windows => "win",
            Platform::MacOS => "macos",
            _ => "linux",
        }
    }

    /// Executable extension for this platform
    pub fn exe_extension(self) -> &'static str {
        match self.resolve() {
            Platform::Windows => ".exe",
            _ => "",
        }
    }
}

/// Target CPU architecture for packaged outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    X64,
    Arm64,
    Ia32,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::Ia32 => "ia32",
        }
    }
}

// ============================================================================
// Section configs
// ============================================================================

/// Local API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Port the HTTPS server listens on
    pub port: u16,

    /// Custom server entry template; must contain the SSL placeholders
    pub entry_template: Option<PathBuf>,

    /// Exact top-level suspend-point call emitted by the server build
    pub suspend_point: String,

    /// The same call without suspension
    pub resumed_call: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 5174,
            entry_template: None,
            suspend_point: "await server.init(".to_string(),
            resumed_call: "server.init(".to_string(),
        }
    }
}

/// Desktop runtime packaging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub platform: Platform,
    pub arch: Arch,

    /// NW.js runtime version
    pub version: String,

    /// NW.js flavor: "normal" or "sdk"
    pub flavor: String,

    /// Desktop-context scripts copied next to the static bundle
    pub scripts_dir: PathBuf,

    /// Script under `scripts_dir` the runtime loads as `node-main`
    pub scripts_entry: String,

    /// Extra manifest fields merged into the generated package.json
    pub manifest: serde_json::Map<String, serde_json::Value>,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Current,
            arch: Arch::X64,
            version: "latest".to_string(),
            flavor: "normal".to_string(),
            scripts_dir: PathBuf::from("src/nw"),
            scripts_entry: "index.js".to_string(),
            manifest: serde_json::Map::new(),
        }
    }
}

/// Native executable packaging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutableConfig {
    /// Node runtime tag, first element of the target triple
    pub node: String,

    /// Output executable name (without extension)
    pub output_name: String,

    pub platform: Platform,
    pub arch: Arch,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        Self {
            node: "node18".to_string(),
            output_name: "api".to_string(),
            platform: Platform::Current,
            arch: Arch::X64,
        }
    }
}

impl ExecutableConfig {
    /// Target triple passed to the native packager, e.g. `node18-linux-x64`
    pub fn target_triple(&self) -> String {
        format!(
            "{}-{}-{}",
            self.node,
            self.platform.pkg_name(),
            self.arch.as_str()
        )
    }
}

/// Base64 key/certificate pair supplied through the environment
#[derive(Clone, Default)]
pub struct SuppliedCertificate {
    pub key_base64: String,
    pub cert_base64: String,
}

impl std::fmt::Debug for SuppliedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppliedCertificate")
            .field("key_base64", &"<redacted>")
            .field("cert_base64", &format_args!("{} bytes", self.cert_base64.len()))
            .finish()
    }
}

/// Self-signed certificate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Archive containing the certificate generation tool
    pub archive_url: String,

    /// Optional SHA-256 of the archive
    pub archive_sha256: Option<String>,

    /// Where the downloaded archive is kept (relative to project root)
    pub archive_path: PathBuf,

    /// Where the archive is extracted (relative to project root)
    pub install_dir: PathBuf,

    /// Tool binary path inside `install_dir`
    pub binary: PathBuf,

    /// Leading path components dropped while extracting
    pub strip_components: usize,

    pub subject: String,
    pub days: u32,
    pub key_bits: u32,

    /// Pre-supplied material; read from the environment, never from the file
    #[serde(skip)]
    pub supplied: Option<SuppliedCertificate>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        let binary = if cfg!(target_os = "windows") {
            "x64/bin/openssl.exe"
        } else {
            "x64/bin/openssl"
        };
        Self {
            archive_url: "https://download.firedaemon.com/FireDaemon-OpenSSL/openssl-3.3.2.zip"
                .to_string(),
            archive_sha256: None,
            archive_path: PathBuf::from(".tools/openssl.zip"),
            install_dir: PathBuf::from(".tools/openssl"),
            binary: PathBuf::from(binary),
            strip_components: 1,
            subject: "/CN=localhost".to_string(),
            days: 3650,
            key_bits: 2048,
            supplied: None,
        }
    }
}

/// Secret token names whose values are embedded into the server bundle
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    pub names: Vec<String>,

    /// Resolved values keyed by name; never serialized
    #[serde(skip)]
    pub values: BTreeMap<String, String>,
}

/// External tool invocations (argv prefixes)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub vite: Vec<String>,
    pub esbuild: Vec<String>,
    pub nwbuild: Vec<String>,
    pub pkg: Vec<String>,

    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
}

fn npx(tool: &str) -> Vec<String> {
    let launcher = if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    };
    vec![launcher.to_string(), tool.to_string()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vite: npx("vite"),
            esbuild: npx("esbuild"),
            nwbuild: npx("nwbuild"),
            pkg: npx("pkg"),
            timeout_secs: 900,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Complete release configuration
// ============================================================================

/// Complete, immutable release configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Project root; every relative path resolves against it
    #[serde(skip)]
    pub project_dir: PathBuf,

    pub api: ApiConfig,
    pub desktop: DesktopConfig,
    pub executable: ExecutableConfig,
    pub certificate: CertificateConfig,
    pub secrets: SecretsConfig,
    pub tools: ToolsConfig,

    /// Never touch the network
    pub offline: bool,
}

impl ReleaseConfig {
    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> ReleaseResult<Self> {
        toml::from_str(content)
            .map_err(|e| ReleaseError::Config(format!("Failed to parse release config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ReleaseResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReleaseError::Config(format!(
                "Failed to read release config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Load configuration for a project directory
    ///
    /// Reads `config_path` (or `release.toml` in the project when present),
    /// then overlays the project's `.env` and the process environment.
    pub fn load(project_dir: impl AsRef<Path>, config_path: Option<&Path>) -> ReleaseResult<Self> {
        let project_dir = project_dir.as_ref();
        let default_path = project_dir.join(CONFIG_FILE_NAME);

        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if default_path.exists() => Self::from_file(&default_path)?,
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                Self::default()
            }
        };
        config.project_dir = project_dir.to_path_buf();

        let env = Environment::capture(project_dir)?;
        config.apply_env(&env)?;
        Ok(config)
    }

    /// Overlay environment-sourced values
    pub fn apply_env(&mut self, env: &Environment) -> ReleaseResult<()> {
        // Absent secrets only matter to the obfuscate stage
        for name in &self.secrets.names {
            if let Some(value) = env.get(name) {
                self.secrets.values.insert(name.clone(), value.to_string());
            }
        }

        match (env.get(ENV_SSL_KEY), env.get(ENV_SSL_CERT)) {
            (Some(key), Some(cert)) => {
                self.certificate.supplied = Some(SuppliedCertificate {
                    key_base64: key.to_string(),
                    cert_base64: cert.to_string(),
                });
            }
            (None, None) => {}
            _ => {
                return Err(ReleaseError::Config(format!(
                    "{} and {} must be supplied together",
                    ENV_SSL_KEY, ENV_SSL_CERT
                )));
            }
        }

        if env.flag(ENV_OFFLINE) {
            self.offline = true;
        }

        Ok(())
    }

    /// Artifact layout rooted at the project directory
    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_dir)
    }
}

/// Snapshot of environment values (`.env` overlaid by the process environment)
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture `.env` from the project root plus the process environment
    ///
    /// The `.env` file is read without exporting its values.
    pub fn capture(project_dir: &Path) -> ReleaseResult<Self> {
        let mut vars = HashMap::new();
        let dotenv = project_dir.join(".env");
        if dotenv.exists() {
            let iter = dotenvy::from_path_iter(&dotenv)
                .map_err(|e| ReleaseError::Config(format!("Failed to read .env: {}", e)))?;
            for item in iter {
                let (key, value) =
                    item.map_err(|e| ReleaseError::Config(format!("Invalid .env entry: {}", e)))?;
                vars.insert(key, value);
            }
            tracing::debug!(path = %dotenv.display(), "Loaded .env");
        }
        vars.extend(std::env::vars());
        Ok(Self { vars })
    }

    /// Build from explicit pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Interpret a variable as a boolean switch
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_flags() {
        assert_eq!(BuildVariant::Static.env_flag().0, "NWJS_BUILD_STATIC");
        assert_eq!(BuildVariant::Api.env_flag().0, "NWJS_BUILD_API");
    }

    #[test]
    fn test_target_triple() {
        let exe = ExecutableConfig {
            platform: Platform::Windows,
            arch: Arch::X64,
            ..Default::default()
        };
        assert_eq!(exe.target_triple(), "node18-win-x64");
    }

    #[test]
    fn test_supplied_certificate_debug_redacts_key() {
        let supplied = SuppliedCertificate {
            key_base64: "c2VjcmV0".to_string(),
            cert_base64: "Y2VydA==".to_string(),
        };
        let shown = format!("{:?}", supplied);
        assert!(!shown.contains("c2VjcmV0"));
    }
}
