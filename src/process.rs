//! Scoped external tool invocation
//!
//! Every collaborator (bundlers, packagers, the certificate tool) runs
//! through a [`ToolRunner`]. The system runner captures both output
//! streams, enforces a timeout and turns a non-zero exit into
//! [`ReleaseError::Subprocess`] carrying the captured stderr.

use crate::error::{ReleaseError, ReleaseResult};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully described external process invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    label: String,
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a command from an argv prefix such as `["npx", "vite"]`
    pub fn new(label: impl Into<String>, argv: &[String]) -> ReleaseResult<Self> {
        let label = label.into();
        let (program, args) = argv.split_first().ok_or_else(|| {
            ReleaseError::Config(format!("No command configured for {}", label))
        })?;
        Ok(Self {
            label,
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(900),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set a variable on the child environment only
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Value following `--flag` (or the `--flag=value` form)
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        let mut iter = self.args.iter();
        while let Some(arg) = iter.next() {
            if arg == flag {
                return iter.next().map(String::as_str);
            }
            if let Some(value) = arg.strip_prefix(&prefix) {
                return Some(value);
            }
        }
        None
    }

    /// Render for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Executes external tools
pub trait ToolRunner {
    /// Run to completion; `Ok` only when the tool exited successfully
    fn run(&self, command: &ToolCommand) -> ReleaseResult<ToolOutput>;
}

/// Runs tools as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

impl ToolRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> ReleaseResult<ToolOutput> {
        tracing::debug!(tool = %command.label, cmd = %command.display(), "Spawning");
        let started = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| ReleaseError::Subprocess {
            tool: command.label.clone(),
            code: None,
            stderr: format!("failed to start '{}': {}", command.program, e),
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= command.timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(tool = %command.label, "Killed after timeout");
                return Err(ReleaseError::Timeout {
                    tool: command.label.clone(),
                    after: command.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ToolOutput {
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            elapsed: started.elapsed(),
        };

        if !status.success() {
            return Err(ReleaseError::Subprocess {
                tool: command.label.clone(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        tracing::debug!(
            tool = %command.label,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_argv_rejected() {
        assert!(ToolCommand::new("vite", &[]).is_err());
    }

    #[test]
    fn test_flag_value_forms() {
        let cmd = ToolCommand::new("pkg", &argv(&["npx", "pkg"]))
            .unwrap()
            .args(["entry.cjs", "--targets", "node18-linux-x64", "--output=dist/api"]);
        assert_eq!(cmd.flag_value("--targets"), Some("node18-linux-x64"));
        assert_eq!(cmd.flag_value("--output"), Some("dist/api"));
        assert_eq!(cmd.flag_value("--missing"), None);
        assert_eq!(cmd.program(), "npx");
    }

    #[test]
    fn test_missing_program_is_subprocess_error() {
        let cmd = ToolCommand::new("ghost", &argv(&["definitely-not-a-real-tool-xyz"])).unwrap();
        let err = SystemRunner::new().run(&cmd).unwrap_err();
        assert!(matches!(err, ReleaseError::Subprocess { code: None, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_captures_stderr() {
        let cmd = ToolCommand::new("sh", &argv(&["sh", "-c", "echo broken >&2; exit 3"])).unwrap();
        match SystemRunner::new().run(&cmd) {
            Err(ReleaseError::Subprocess { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_child_env_and_stdout() {
        let cmd = ToolCommand::new("sh", &argv(&["sh", "-c", "printf %s \"$NWJS_BUILD_API\""]))
            .unwrap()
            .env("NWJS_BUILD_API", "1");
        let output = SystemRunner::new().run(&cmd).unwrap();
        assert_eq!(output.stdout, "1");
        assert!(std::env::var("NWJS_BUILD_API").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let cmd = ToolCommand::new("sleep", &argv(&["sleep", "5"]))
            .unwrap()
            .timeout(Duration::from_millis(200));
        let err = SystemRunner::new().run(&cmd).unwrap_err();
        assert!(matches!(err, ReleaseError::Timeout { .. }));
    }
}
