//! Secret obfuscation and certificate injection into the CommonJS server

use crate::artifact::{ModuleFormat, ServerArtifact, SlotKind};
use crate::certificate::CertificateMaterial;
use crate::error::{ReleaseError, ReleaseResult};
use crate::layout::ProjectLayout;
use crate::obfuscate::{obfuscate, SecretToken};
use crate::replace::ReplaceRule;
use crate::service::{SSL_CERT_SLOT, SSL_KEY_SLOT};
use std::fs;

/// What the `obfuscate` stage changed
#[derive(Debug, Clone, Default)]
pub struct InjectReport {
    /// Secrets replaced at least once
    pub secrets_replaced: Vec<String>,
    /// Secrets that were not found in the server file
    pub secrets_missing: Vec<String>,
    /// Whether the certificate slots were filled in this run
    pub certificate_injected: bool,
}

/// Expression keeping the runtime override but falling back to `pem`
fn fallback_expression(slot: &str, pem: &str) -> String {
    format!("({}||{})", slot, obfuscate(pem))
}

/// Hide every secret token and embed the certificate pair
pub fn inject(
    layout: &ProjectLayout,
    artifact: &mut ServerArtifact,
    secrets: &[SecretToken],
    material: &CertificateMaterial,
) -> ReleaseResult<InjectReport> {
    if artifact.format != ModuleFormat::Cjs {
        return Err(ReleaseError::Config(format!(
            "Server entry {} has not been converted to CommonJS",
            artifact.entry.display()
        )));
    }

    let root = layout.root();
    let server_file = root.join(&artifact.entry);
    let server_glob = glob::Pattern::escape(&server_file.to_string_lossy());
    let mut report = InjectReport::default();

    for token in secrets {
        let outcome =
            ReplaceRule::literal(token.literal(), token.obfuscated(), server_glob.as_str())
                .apply()?;
        if outcome.is_noop() {
            report.secrets_missing.push(token.name().to_string());
        } else {
            tracing::info!(
                secret = token.name(),
                occurrences = outcome.occurrences,
                "Obfuscated secret"
            );
            report.secrets_replaced.push(token.name().to_string());
        }

        let uncovered = token.uncovered_chars();
        if !uncovered.is_empty() {
            tracing::debug!(
                secret = token.name(),
                visible = uncovered.len(),
                "Secret has characters that stay readable"
            );
        }
    }

    let content = fs::read_to_string(&server_file)?;
    for token in secrets.iter().filter(|t| t.appears_in(&content)) {
        tracing::warn!(secret = token.name(), "Raw secret value still present in server file");
    }

    let key_filled = artifact.fill(
        root,
        SlotKind::SslKey,
        &fallback_expression(SSL_KEY_SLOT, material.key_pem()),
    )?;
    let cert_filled = artifact.fill(
        root,
        SlotKind::SslCert,
        &fallback_expression(SSL_CERT_SLOT, material.cert_pem()),
    )?;
    report.certificate_injected = key_filled || cert_filled;
    if report.certificate_injected {
        tracing::info!(provenance = material.provenance().as_str(), "Injected certificate");
    }

    artifact.save(layout)?;
    Ok(report)
}
