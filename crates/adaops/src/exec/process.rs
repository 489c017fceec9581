//! Child-process runner backed by `tokio::process`.

use crate::exec::runner::{CommandOutput, CommandRunner, ExecError, Invocation};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs invocations as real child processes.
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child and fail with [`ExecError::Timeout`] once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        let cmd_line = invocation.command_line();
        debug!(cmd = %cmd_line, cwd = ?invocation.cwd, "executing");

        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(cmd = %cmd_line, secs = limit.as_secs(), "command timed out");
                    return Err(ExecError::Timeout {
                        cmd: cmd_line,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => cmd.output().await,
        }
        .map_err(|source| ExecError::Spawn {
            cmd: cmd_line.clone(),
            source,
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
            cmd: cmd_line,
        })
    }
}

/// Resolve `binary` to an executable path: a path containing a separator is taken
/// as-is, a bare name is searched in `PATH`.
pub fn resolve_binary(binary: &str) -> Result<PathBuf, ExecError> {
    let candidate = Path::new(binary);
    let found = if candidate.components().count() > 1 {
        candidate.is_file().then(|| candidate.to_path_buf())
    } else {
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(binary))
                .find(|p| p.is_file())
        })
    };
    let path = found.ok_or_else(|| ExecError::BinaryNotFound(binary.to_string()))?;
    if !is_executable(&path) {
        return Err(ExecError::NotExecutable(path.display().to_string()));
    }
    Ok(path)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
