//! Fixed artifact locations inside a project
//!
//! Every stage reads and writes through these paths, so the build artifact
//! tree has a single definition.

use crate::config::Platform;
use std::path::{Path, PathBuf};

/// Artifact paths relative to the project root
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project `package.json` (name and version source)
    pub fn package_json(&self) -> PathBuf {
        self.root.join("package.json")
    }

    /// Frontend bundler output, shared by both build variants
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Entry page of the static bundle
    pub fn static_index(&self) -> PathBuf {
        self.build_dir().join("index.html")
    }

    /// Request handler emitted by the server build
    pub fn handler_file(&self) -> PathBuf {
        self.build_dir().join("handler.js")
    }

    /// Generated HTTPS server entry
    pub fn server_entry(&self) -> PathBuf {
        self.build_dir().join("serve.js")
    }

    /// Assembled desktop application source
    pub fn desktop_src(&self) -> PathBuf {
        self.root.join("nw")
    }

    /// Desktop runtime packager output
    pub fn desktop_out(&self) -> PathBuf {
        self.root.join("dist").join("desktop")
    }

    /// Directory holding the converted single-file server
    pub fn server_dir(&self) -> PathBuf {
        self.root.join("dist").join("server")
    }

    /// Raw bundler output before relocation
    pub fn server_bundle(&self) -> PathBuf {
        self.server_dir().join("bundle.cjs")
    }

    /// Final single-file server
    pub fn server_file(&self) -> PathBuf {
        self.server_dir().join("index.cjs")
    }

    /// Typed descriptor of the server artifact
    pub fn artifact_descriptor(&self) -> PathBuf {
        self.root.join("dist").join("server.artifact.json")
    }

    /// Native executable output path
    pub fn executable(&self, name: &str, platform: Platform) -> PathBuf {
        self.root
            .join("dist")
            .join(format!("{}{}", name, platform.exe_extension()))
    }

    pub fn ssl_dir(&self) -> PathBuf {
        self.root.join("ssl")
    }

    pub fn key_pem(&self) -> PathBuf {
        self.ssl_dir().join("key.pem")
    }

    pub fn cert_pem(&self) -> PathBuf {
        self.ssl_dir().join("cert.pem")
    }

    /// Base64 key sidecar for external secret storage
    pub fn key_sidecar(&self) -> PathBuf {
        self.root.join("ssl.key")
    }

    /// Base64 certificate sidecar for external secret storage
    pub fn cert_sidecar(&self) -> PathBuf {
        self.root.join("ssl.crt")
    }

    /// Resolve a configured path against the root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path relative to the root, for logs and descriptors
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}
