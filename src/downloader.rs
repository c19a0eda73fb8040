//! Archive download and extraction
//!
//! This module provides functionality for:
//! - Downloading tool archives to a fixed local path
//! - Checksum verification (SHA256/SHA512)
//! - HTTPS enforcement and offline mode
//! - Extraction (zip, tar.gz, tar) with strip_components support

use crate::error::{ReleaseError, ReleaseResult};
use crate::progress::ProgressStyles;
use indicatif::ProgressBar;
use sha2::{Digest, Sha256, Sha512};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of downloadable, extractable archives
pub trait ArchiveSource {
    /// Download `url` to `dest`, verifying `checksum` when given
    fn download(&self, url: &str, dest: &Path, checksum: Option<&str>) -> ReleaseResult<()>;

    /// Extract `archive` into `dest`, dropping `strip_components` leading path parts
    fn extract(&self, archive: &Path, dest: &Path, strip_components: usize) -> ReleaseResult<()>;
}

/// Download manager for external tool archives
#[derive(Debug, Clone, Default)]
pub struct Downloader {
    /// Allow insecure HTTP downloads
    allow_insecure: bool,
    /// Offline mode (never touch the network)
    offline: bool,
}

impl Downloader {
    /// Create a new downloader
    pub fn new() -> Self {
        Self::default()
    }

    /// Set insecure mode
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Set offline mode
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    // ====================================================================
    // Private methods
    // ====================================================================

    /// Validate URL against security rules
    fn validate_url(&self, url: &str) -> ReleaseResult<()> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ReleaseError::Config(format!("Invalid URL {}: {}", url, e)))?;

        if !self.allow_insecure && parsed.scheme() != "https" {
            warn!(url = %url, scheme = %parsed.scheme(), "Insecure protocol blocked");
            return Err(ReleaseError::Config(format!(
                "Insecure URL scheme ({}), HTTPS required",
                parsed.scheme()
            )));
        }

        Ok(())
    }

    /// Fetch URL content with a byte progress bar
    fn fetch_url(&self, url: &str) -> ReleaseResult<Vec<u8>> {
        let response = ureq::get(url)
            .call()
            .map_err(|e| ReleaseError::Network(format!("Failed to download {}: {}", url, e)))?;

        let total = response
            .header("Content-Length")
            .and_then(|len| len.parse::<u64>().ok())
            .unwrap_or(0);
        let pb = ProgressBar::new(total);
        pb.set_style(ProgressStyles::download());
        pb.set_message("downloading");

        let mut buffer = Vec::new();
        pb.wrap_read(response.into_reader())
            .read_to_end(&mut buffer)
            .map_err(|e| ReleaseError::Network(format!("Failed to read response: {}", e)))?;
        pb.finish_and_clear();

        debug!("Downloaded {} bytes from {}", buffer.len(), url);
        Ok(buffer)
    }

    /// Verify checksum
    fn verify_checksum(&self, content: &[u8], expected: &str) -> ReleaseResult<()> {
        let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
        let actual = if expected.len() == 64 {
            let mut hasher = Sha256::new();
            hasher.update(content);
            format!("{:x}", hasher.finalize())
        } else if expected.len() == 128 {
            let mut hasher = Sha512::new();
            hasher.update(content);
            format!("{:x}", hasher.finalize())
        } else {
            return Err(ReleaseError::Config(format!(
                "Invalid checksum length: {} (expected 64 for SHA256 or 128 for SHA512)",
                expected.len()
            )));
        };

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ReleaseError::Network(format!(
                "Checksum mismatch:\n  Expected: {}\n  Actual:   {}",
                expected, actual
            )));
        }

        info!("Checksum verified successfully");
        Ok(())
    }

    /// Write content atomically next to its destination
    fn save(&self, dest: &Path, content: &[u8]) -> ReleaseResult<()> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(content)?;
        file.persist(dest).map_err(|e| ReleaseError::Io(e.error))?;
        info!("Saved {} ({} bytes)", dest.display(), content.len());
        Ok(())
    }

    /// Extract zip archive
    fn extract_zip(
        &self,
        archive_path: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> ReleaseResult<()> {
        let file = fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ReleaseError::Archive(format!("Failed to read zip: {}", e)))?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| ReleaseError::Archive(format!("Failed to read zip entry: {}", e)))?;

            let file_path = file.mangled_name();
            let stripped = self.strip_path_components(&file_path, strip_components);

            if let Some(output_path) = stripped {
                let full_path = dest.join(output_path);

                if file.is_dir() {
                    fs::create_dir_all(&full_path)?;
                } else {
                    if let Some(parent) = full_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut outfile = fs::File::create(&full_path)?;
                    io::copy(&mut file, &mut outfile)?;

                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        if let Some(mode) = file.unix_mode() {
                            if mode & 0o111 != 0 {
                                let mut perms = outfile.metadata()?.permissions();
                                perms.set_mode(mode);
                                fs::set_permissions(&full_path, perms)?;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Extract tar archive from any reader
    fn extract_tar<R: Read>(
        &self,
        reader: R,
        dest: &Path,
        strip_components: usize,
    ) -> ReleaseResult<()> {
        let mut archive = tar::Archive::new(reader);

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let stripped = self.strip_path_components(&path, strip_components);

            if let Some(output_path) = stripped {
                let full_path = dest.join(output_path);
                if let Some(parent) = full_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&full_path)?;
            }
        }

        Ok(())
    }

    /// Strip N path components from the beginning
    fn strip_path_components(&self, path: &Path, n: usize) -> Option<PathBuf> {
        if n == 0 {
            return Some(path.to_path_buf());
        }

        let components: Vec<_> = path.components().skip(n).collect();
        if components.is_empty() {
            None
        } else {
            Some(components.iter().collect())
        }
    }
}

impl ArchiveSource for Downloader {
    fn download(&self, url: &str, dest: &Path, checksum: Option<&str>) -> ReleaseResult<()> {
        info!(url = %url, dest = %dest.display(), offline = self.offline, "Starting download");

        if self.offline {
            return Err(ReleaseError::Network(format!(
                "Offline mode: {} is not present and cannot be downloaded",
                dest.display()
            )));
        }

        self.validate_url(url)?;
        let content = self.fetch_url(url)?;

        match checksum {
            Some(expected) => self.verify_checksum(&content, expected)?,
            None => warn!("No checksum provided for {}, skipping verification", url),
        }

        self.save(dest, &content)
    }

    fn extract(&self, archive: &Path, dest: &Path, strip_components: usize) -> ReleaseResult<()> {
        info!(
            "Extracting {} to {} (strip: {})",
            archive.display(),
            dest.display(),
            strip_components
        );

        fs::create_dir_all(dest)?;

        let name = archive
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        if name.ends_with(".zip") {
            self.extract_zip(archive, dest, strip_components)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            let decoder = flate2::read::GzDecoder::new(fs::File::open(archive)?);
            self.extract_tar(decoder, dest, strip_components)
        } else if name.ends_with(".tar") {
            self.extract_tar(fs::File::open(archive)?, dest, strip_components)
        } else {
            Err(ReleaseError::Archive(format!(
                "Unsupported archive format: {}",
                archive.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_downloader_creation() {
        let downloader = Downloader::new();
        assert!(!downloader.allow_insecure);
        assert!(!downloader.offline);
    }

    #[test]
    fn test_url_validation_https() {
        let downloader = Downloader::new();

        assert!(downloader
            .validate_url("https://example.com/file.zip")
            .is_ok());
        assert!(downloader
            .validate_url("http://example.com/file.zip")
            .is_err());
    }

    #[test]
    fn test_url_validation_insecure() {
        let downloader = Downloader::new().allow_insecure(true);

        assert!(downloader
            .validate_url("http://example.com/file.zip")
            .is_ok());
    }

    #[test]
    fn test_checksum_sha256() {
        let downloader = Downloader::new();
        let content = b"hello world";

        let sha256 = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(downloader.verify_checksum(content, sha256).is_ok());
        assert!(downloader
            .verify_checksum(content, &format!("sha256:{}", sha256))
            .is_ok());

        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        assert!(downloader.verify_checksum(content, wrong).is_err());
    }

    #[test]
    fn test_offline_download_is_network_error() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("tool.zip");
        let err = Downloader::new()
            .offline(true)
            .download("https://example.com/tool.zip", &dest, None)
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Network(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_strip_path_components() {
        let downloader = Downloader::new();
        let path = Path::new("a/b/c/file.txt");

        assert_eq!(
            downloader.strip_path_components(path, 0),
            Some(PathBuf::from("a/b/c/file.txt"))
        );
        assert_eq!(
            downloader.strip_path_components(path, 1),
            Some(PathBuf::from("b/c/file.txt"))
        );
        assert_eq!(
            downloader.strip_path_components(path, 3),
            Some(PathBuf::from("file.txt"))
        );
        assert_eq!(downloader.strip_path_components(path, 4), None);
    }

    #[test]
    fn test_extract_tar_gz_strips_root() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("tool.tar.gz");

        {
            let file = fs::File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "openssl-3/bin/openssl", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = temp.path().join("out");
        Downloader::new().extract(&archive_path, &dest, 1).unwrap();
        assert!(dest.join("bin/openssl").exists());
    }

    #[test]
    fn test_extract_unknown_format() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.rar");
        fs::write(&archive, b"").unwrap();
        assert!(matches!(
            Downloader::new().extract(&archive, &temp.path().join("out"), 0),
            Err(ReleaseError::Archive(_))
        ));
    }
}
