//! Service bundle: server build plus the HTTPS entry point
//!
//! After the server build, the request handler is wrapped in a generated
//! HTTPS entry and a [`ServerArtifact`] descriptor records the placeholders
//! the conversion and injection stages will patch.

use crate::artifact::{ModuleFormat, ServerArtifact, SlotKind};
use crate::config::{ApiConfig, BuildVariant, ReleaseConfig};
use crate::error::{ReleaseError, ReleaseResult};
use crate::frontend::FrontendBuilder;
use crate::layout::ProjectLayout;
use crate::process::ToolRunner;
use std::fs;

/// Placeholder for the runtime private key
pub const SSL_KEY_SLOT: &str = "process.env.SSLKEY";

/// Placeholder for the runtime certificate
pub const SSL_CERT_SLOT: &str = "process.env.SSLCRT";

const PORT_MARKER: &str = "{{port}}";

const DEFAULT_ENTRY: &str = r#"import fs from 'fs';
import https from 'https';
import { handler } from './handler.js';

const API_PORT = {{port}};

const readSidecar = (path) => Buffer.from(fs.readFileSync(path, 'utf-8'), 'base64').toString('utf-8');

const sslKey = process.env.SSLKEY || readSidecar('ssl.key');
const sslCrt = process.env.SSLCRT || readSidecar('ssl.crt');

https
	.createServer({ key: sslKey, cert: sslCrt }, (request, response) => {
		handler(request, response);
	})
	.listen(API_PORT, () => {
		console.log('Listening on port', API_PORT);
	});
"#;

/// Render the server entry source for `api`
pub fn render_entry(api: &ApiConfig, layout: &ProjectLayout) -> ReleaseResult<String> {
    let template = match api.entry_template {
        Some(ref path) => {
            let path = layout.resolve(path);
            fs::read_to_string(&path).map_err(|e| {
                ReleaseError::Config(format!(
                    "Failed to read entry template {}: {}",
                    path.display(),
                    e
                ))
            })?
        }
        None => DEFAULT_ENTRY.to_string(),
    };
    Ok(template.replace(PORT_MARKER, &api.port.to_string()))
}

/// Describe the freshly built server and check its placeholders exist
pub fn describe(api: &ApiConfig, layout: &ProjectLayout) -> ReleaseResult<ServerArtifact> {
    let entry = layout.relative(&layout.server_entry()).to_path_buf();
    let handler = layout.relative(&layout.handler_file()).to_path_buf();

    let artifact = ServerArtifact::new(&entry, ModuleFormat::Esm)
        .with_slot(SlotKind::SuspendPoint, handler, api.suspend_point.clone())
        .with_slot(SlotKind::SslKey, &entry, SSL_KEY_SLOT)
        .with_slot(SlotKind::SslCert, &entry, SSL_CERT_SLOT);
    artifact.verify(layout.root())?;
    Ok(artifact)
}

/// The `api` stage
pub fn produce(
    config: &ReleaseConfig,
    layout: &ProjectLayout,
    runner: &dyn ToolRunner,
) -> ReleaseResult<ServerArtifact> {
    FrontendBuilder::new(&config.tools, layout, runner).build(BuildVariant::Api)?;

    let entry_path = layout.server_entry();
    fs::write(&entry_path, render_entry(&config.api, layout)?)?;
    tracing::info!(path = %entry_path.display(), "Wrote server entry");

    let artifact = describe(&config.api, layout)?;
    artifact.save(layout)?;
    Ok(artifact)
}
