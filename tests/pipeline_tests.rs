//! Tests for nw-release pipeline module

mod common;

use common::{entries, new_log, project, FakeArchives, FakeRunner, CERT_PEM, SECRET_VALUE};
use nw_release::{
    CertificateConfig, Downloader, ErrorKind, ModuleFormat, Pipeline, ReleaseError,
    ReleaseResult, ReleaseStages, ServerArtifact, SlotKind, Stage, StageHandler,
    NODE_MAIN_KEY, TRUST_ANCHORS_KEY,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Writes one marker file per stage and fails at a chosen stage
struct MarkerStages {
    dir: PathBuf,
    fail_at: Option<Stage>,
    calls: Vec<Stage>,
}

impl StageHandler for MarkerStages {
    fn run_stage(&mut self, stage: Stage) -> ReleaseResult<()> {
        self.calls.push(stage);
        if self.fail_at == Some(stage) {
            return Err(ReleaseError::MissingArtifact(self.dir.join("injected")));
        }
        fs::write(self.dir.join(stage.name()), stage.name())?;
        Ok(())
    }
}

#[test]
fn test_fault_injection_at_every_position() {
    for k in 0..Stage::SEQUENCE.len() {
        let temp = TempDir::new().unwrap();
        let failing = Stage::SEQUENCE[k];
        let mut pipeline = Pipeline::new(MarkerStages {
            dir: temp.path().to_path_buf(),
            fail_at: Some(failing),
            calls: Vec::new(),
        })
        .hidden_progress();

        assert!(pipeline.run(Stage::All).is_err());

        let handler = pipeline.into_handler();
        assert_eq!(handler.calls, Stage::SEQUENCE[..=k].to_vec());
        for done in &Stage::SEQUENCE[..k] {
            assert_eq!(
                fs::read_to_string(temp.path().join(done.name())).unwrap(),
                done.name()
            );
        }
        for skipped in &Stage::SEQUENCE[k..] {
            assert!(!temp.path().join(skipped.name()).exists());
        }
    }
}

#[test]
fn test_all_runs_in_fixed_order() {
    let temp = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(MarkerStages {
        dir: temp.path().to_path_buf(),
        fail_at: None,
        calls: Vec::new(),
    })
    .hidden_progress();

    let report = pipeline.run(Stage::All).unwrap();
    assert_eq!(report.stages(), Stage::SEQUENCE.to_vec());
    assert_eq!(pipeline.handler().calls, Stage::SEQUENCE.to_vec());
}

#[test]
fn test_single_stage_runs_alone() {
    let temp = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(MarkerStages {
        dir: temp.path().to_path_buf(),
        fail_at: None,
        calls: Vec::new(),
    })
    .hidden_progress();

    let report = pipeline.run(Stage::Api).unwrap();
    assert_eq!(report.stages(), vec![Stage::Api]);
}

#[test]
fn test_full_release_with_fake_tools() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();

    let mut pipeline = Pipeline::new(stages).hidden_progress();
    pipeline.run(Stage::All).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "download",
            "extract",
            "openssl",
            "vite (static)",
            "nwbuild",
            "vite (api)",
            "esbuild",
            "pkg"
        ]
    );

    // Desktop manifest trusts the generated certificate
    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(layout.desktop_src().join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["name"], "demo-app");
    assert_eq!(manifest["version"], "1.2.3");
    assert_eq!(manifest[TRUST_ANCHORS_KEY][0], CERT_PEM);
    assert!(layout.desktop_src().join("index.html").exists());
    assert!(layout.desktop_src().join("nw/index.js").exists());

    // Server is CommonJS, obfuscated and certificate-injected
    let server = fs::read_to_string(layout.server_file()).unwrap();
    assert!(!server.contains("await server.init("));
    assert!(!server.contains(&format!("\"{}\"", SECRET_VALUE)));
    assert!(server.contains("require(\"./chunks/x.js\")"));
    assert!(server.contains("(process.env.SSLKEY||("));
    assert!(!server.contains("PRIVATE KEY"));
    let package: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(layout.server_dir().join("package.json")).unwrap())
            .unwrap();
    assert_eq!(package["type"], "commonjs");

    let artifact = ServerArtifact::load(&layout).unwrap();
    assert_eq!(artifact.format, ModuleFormat::Cjs);
    assert!(artifact.unfilled().is_empty());

    let exe = layout.executable("api", nw_release::Platform::Current);
    assert!(exe.exists());
}

#[test]
fn test_failure_leaves_earlier_artifacts() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone()).failing("nwbuild")),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();

    let err = Pipeline::new(stages)
        .hidden_progress()
        .run(Stage::All)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Subprocess);
    assert!(layout.cert_pem().exists());
    assert!(layout.static_index().exists());
    assert!(layout.desktop_src().join("package.json").exists());
    let calls = entries(&log);
    assert_eq!(calls.last().map(String::as_str), Some("nwbuild"));
    assert!(!calls.iter().any(|c| c == "pkg" || c.starts_with("vite (api)")));
}

#[test]
fn test_offline_without_tool_aborts_before_packaging() {
    let temp = TempDir::new().unwrap();
    let mut config = project(temp.path());
    config.offline = true;
    let log = new_log();
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(Downloader::new().offline(true)),
    );

    let err = Pipeline::new(stages)
        .hidden_progress()
        .run(Stage::All)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    // Stopped inside ssl: no tool ran, not even the static build
    assert!(entries(&log).is_empty());
    assert!(!entries(&log).iter().any(|c| c == "pkg"));
}

#[test]
fn test_stages_without_secrets_run_when_secret_is_unset() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(nw_release::CONFIG_FILE_NAME),
        "[secrets]\nnames = [\"NW_RELEASE_TEST_UNSET_SECRET\"]\n",
    )
    .unwrap();
    common::project(temp.path());
    let config = nw_release::ReleaseConfig::load(temp.path(), None).unwrap();
    assert!(config.secrets.values.is_empty());

    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();

    Pipeline::new(stages)
        .hidden_progress()
        .run(Stage::Ssl)
        .unwrap();
    assert!(layout.cert_pem().exists());
}

#[test]
fn test_obfuscate_fails_when_secret_is_unset() {
    let temp = TempDir::new().unwrap();
    let mut config = project(temp.path());
    config.secrets.values.clear();
    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();
    let mut pipeline = Pipeline::new(stages).hidden_progress();

    for stage in [Stage::Ssl, Stage::Api, Stage::EsmToCjs] {
        pipeline.run(stage).unwrap();
    }
    let before = fs::read_to_string(layout.server_file()).unwrap();

    let err = pipeline.run(Stage::Obfuscate).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("API_TOKEN"));
    assert_eq!(fs::read_to_string(layout.server_file()).unwrap(), before);
}

#[test]
fn test_desktop_manifest_loads_copied_scripts() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();
    let mut pipeline = Pipeline::new(stages).hidden_progress();

    for stage in [Stage::Ssl, Stage::Static, Stage::Prebuild] {
        pipeline.run(stage).unwrap();
    }

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(layout.desktop_src().join("package.json")).unwrap(),
    )
    .unwrap();
    let script = manifest[NODE_MAIN_KEY].as_str().unwrap();
    assert_eq!(script, "nw/index.js");
    assert!(layout.desktop_src().join(script).exists());
}

#[test]
fn test_configured_node_main_wins() {
    let temp = TempDir::new().unwrap();
    let mut config = project(temp.path());
    config
        .desktop
        .manifest
        .insert(NODE_MAIN_KEY.to_string(), serde_json::json!("nw/boot.js"));
    let log = new_log();
    let binary = CertificateConfig::default().binary;
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), binary)),
    );
    let layout = stages.layout().clone();
    let mut pipeline = Pipeline::new(stages).hidden_progress();

    for stage in [Stage::Ssl, Stage::Static, Stage::Prebuild] {
        pipeline.run(stage).unwrap();
    }

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(layout.desktop_src().join("package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest[NODE_MAIN_KEY], "nw/boot.js");
}

#[test]
fn test_cjstoexe_requires_converted_server() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let log = new_log();
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), "bin/openssl")),
    );
    let layout = stages.layout().clone();

    let artifact = ServerArtifact::new("build/serve.js", ModuleFormat::Esm).with_slot(
        SlotKind::SslKey,
        "build/serve.js",
        "process.env.SSLKEY",
    );
    artifact.save(&layout).unwrap();

    let err = Pipeline::new(stages)
        .hidden_progress()
        .run(Stage::CjsToExe)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_esmtocjs_without_api_build_is_missing_artifact() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let log = new_log();
    let stages = ReleaseStages::with_backends(
        config,
        Box::new(FakeRunner::new(log.clone())),
        Box::new(FakeArchives::new(log.clone(), "bin/openssl")),
    );

    let err = Pipeline::new(stages)
        .hidden_progress()
        .run(Stage::EsmToCjs)
        .unwrap_err();
    assert!(matches!(err, ReleaseError::MissingArtifact(_)));
}
