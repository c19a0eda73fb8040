//! Self-signed TLS certificate lifecycle
//!
//! Resolution order, first match wins:
//!
//! 1. Base64 key and certificate supplied through configuration
//! 2. A key/certificate pair already on disk (`ssl/key.pem`, `ssl/cert.pem`)
//! 3. Generation with a locally installed certificate tool, downloading and
//!    extracting the tool archive first when the install directory is absent
//!
//! An existing pair is never overwritten. Generation also writes base64
//! sidecars (`ssl.key`, `ssl.crt`) for external secret storage.

use crate::config::CertificateConfig;
use crate::downloader::ArchiveSource;
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::process::{ToolCommand, ToolRunner};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PEM_MARKER: &str = "-----BEGIN";

/// Where certificate material came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Supplied,
    Cached,
    Generated,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Supplied => "supplied",
            Provenance::Cached => "cached",
            Provenance::Generated => "generated",
        }
    }
}

/// A PEM private key and certificate
#[derive(Clone)]
pub struct CertificateMaterial {
    key_pem: String,
    cert_pem: String,
    provenance: Provenance,
}

impl CertificateMaterial {
    pub fn new(key_pem: String, cert_pem: String, provenance: Provenance) -> Self {
        Self {
            key_pem,
            cert_pem,
            provenance,
        }
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Certificate the desktop shell should trust implicitly
    pub fn trust_anchor(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_base64(&self) -> String {
        STANDARD.encode(&self.key_pem)
    }

    pub fn cert_base64(&self) -> String {
        STANDARD.encode(&self.cert_pem)
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("key_pem", &"<redacted>")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("provenance", &self.provenance)
            .finish()
    }
}

/// Generates or reuses the local API certificate
pub struct CertificateManager<'a> {
    config: &'a CertificateConfig,
    layout: &'a ProjectLayout,
    archives: &'a dyn ArchiveSource,
    runner: &'a dyn ToolRunner,
    timeout: Duration,
}

impl<'a> CertificateManager<'a> {
    pub fn new(
        config: &'a CertificateConfig,
        layout: &'a ProjectLayout,
        archives: &'a dyn ArchiveSource,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            config,
            layout,
            archives,
            runner,
            timeout: Duration::from_secs(120),
        }
    }

    /// Time budget for the generation subprocess
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplied, cached or freshly generated material
    pub fn ensure(&self) -> ReleaseResult<CertificateMaterial> {
        if let Some(material) = self.supplied()? {
            info!("Using supplied certificate");
            return Ok(material);
        }

        if let Some(material) = self.cached()? {
            info!(path = %self.layout.cert_pem().display(), "Reusing existing certificate");
            self.write_sidecars(&material, true)?;
            return Ok(material);
        }

        self.generate()
    }

    /// Supplied or cached material, without generating
    pub fn load(&self) -> ReleaseResult<CertificateMaterial> {
        if let Some(material) = self.supplied()? {
            return Ok(material);
        }
        self.cached()?
            .ok_or_else(|| ReleaseError::MissingArtifact(self.layout.cert_pem()))
    }

    fn supplied(&self) -> ReleaseResult<Option<CertificateMaterial>> {
        let Some(ref supplied) = self.config.supplied else {
            return Ok(None);
        };
        let key_pem = decode_pem("key", &supplied.key_base64)?;
        let cert_pem = decode_pem("certificate", &supplied.cert_base64)?;
        Ok(Some(CertificateMaterial::new(
            key_pem,
            cert_pem,
            Provenance::Supplied,
        )))
    }

    fn cached(&self) -> ReleaseResult<Option<CertificateMaterial>> {
        let key_path = self.layout.key_pem();
        let cert_path = self.layout.cert_pem();

        match (key_path.exists(), cert_path.exists()) {
            (true, true) => Ok(Some(CertificateMaterial::new(
                fs::read_to_string(&key_path)?,
                fs::read_to_string(&cert_path)?,
                Provenance::Cached,
            ))),
            (false, false) => Ok(None),
            // Half a pair: refuse rather than overwrite the surviving file
            (true, false) => Err(ReleaseError::MissingArtifact(cert_path)),
            (false, true) => Err(ReleaseError::MissingArtifact(key_path)),
        }
    }

    /// Make sure the generation tool is installed and return its binary
    fn ensure_tool(&self) -> ReleaseResult<PathBuf> {
        let archive = self.layout.resolve(&self.config.archive_path);
        let install_dir = self.layout.resolve(&self.config.install_dir);

        if install_dir.exists() {
            debug!(path = %install_dir.display(), "Certificate tool already installed");
        } else {
            if archive.exists() {
                debug!(path = %archive.display(), "Reusing downloaded archive");
            } else {
                self.archives.download(
                    &self.config.archive_url,
                    &archive,
                    self.config.archive_sha256.as_deref(),
                )?;
            }
            self.archives
                .extract(&archive, &install_dir, self.config.strip_components)?;
        }

        let binary = install_dir.join(&self.config.binary);
        if !binary.exists() {
            return Err(ReleaseError::MissingArtifact(binary));
        }
        Ok(binary)
    }

    fn generate(&self) -> ReleaseResult<CertificateMaterial> {
        let tool = self.ensure_tool()?;
        let key_path = self.layout.key_pem();
        let cert_path = self.layout.cert_pem();
        fs::create_dir_all(self.layout.ssl_dir())?;

        info!(tool = %tool.display(), "Generating self-signed certificate");
        let command = ToolCommand::new("openssl", &[tool.to_string_lossy().into_owned()])?
            .args(generation_args(self.config, &key_path, &cert_path))
            .current_dir(self.layout.root())
            .timeout(self.timeout);
        self.runner.run(&command)?;

        for path in [&key_path, &cert_path] {
            if !path.exists() {
                return Err(ReleaseError::MissingArtifact(path.clone()));
            }
        }

        let material = CertificateMaterial::new(
            fs::read_to_string(&key_path)?,
            fs::read_to_string(&cert_path)?,
            Provenance::Generated,
        );
        self.write_sidecars(&material, false)?;
        info!(path = %cert_path.display(), "Certificate generated");
        Ok(material)
    }

    fn write_sidecars(
        &self,
        material: &CertificateMaterial,
        only_missing: bool,
    ) -> ReleaseResult<()> {
        let sidecars = [
            (self.layout.key_sidecar(), material.key_base64()),
            (self.layout.cert_sidecar(), material.cert_base64()),
        ];
        for (path, content) in sidecars {
            if only_missing && path.exists() {
                continue;
            }
            fs::write(&path, content)?;
            debug!(path = %path.display(), "Wrote base64 sidecar");
        }
        Ok(())
    }
}

/// RSA, SHA-256, self-signed, non-interactive
fn generation_args(config: &CertificateConfig, key: &Path, cert: &Path) -> Vec<String> {
    vec![
        "req".to_string(),
        "-x509".to_string(),
        "-newkey".to_string(),
        format!("rsa:{}", config.key_bits),
        "-sha256".to_string(),
        "-days".to_string(),
        config.days.to_string(),
        "-nodes".to_string(),
        "-keyout".to_string(),
        key.to_string_lossy().into_owned(),
        "-out".to_string(),
        cert.to_string_lossy().into_owned(),
        "-subj".to_string(),
        config.subject.clone(),
        "-addext".to_string(),
        "subjectAltName=DNS:localhost,IP:127.0.0.1".to_string(),
    ]
}

fn decode_pem(what: &str, encoded: &str) -> ReleaseResult<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| {
            ReleaseError::Config(format!("Supplied {} is not valid base64: {}", what, e))
        })?;
    let pem = String::from_utf8(bytes)
        .map_err(|_| ReleaseError::Config(format!("Supplied {} is not UTF-8 PEM text", what)))?;
    if !pem.contains(PEM_MARKER) {
        return Err(ReleaseError::Config(format!(
            "Supplied {} is not PEM encoded",
            what
        )));
    }
    Ok(pem)
}
