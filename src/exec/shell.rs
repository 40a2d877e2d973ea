// src/exec/shell.rs

//! Shell-backed executor.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::exec::Executor;
use crate::rule::BoxFuture;

/// Command prefix used when none is configured.
pub const DEFAULT_SHELL: [&str; 3] = ["/usr/bin/env", "sh", "-c"];

/// Runs each command as `shell[0] shell[1..] <command>`.
///
/// stdout and stderr are consumed line by line and logged at `debug`, so
/// chatty recipes never block on a full pipe.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    pub shell: Vec<String>,
    /// Working directory; the current one when `None`.
    pub dir: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.iter().map(|s| s.to_string()).collect(),
            dir: None,
            env: Vec::new(),
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: Vec<String>) -> Self {
        if !shell.is_empty() {
            self.shell = shell;
        }
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    async fn run(&self, command: &str, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;

        let Some((program, args)) = self.shell.split_first() else {
            bail!("no shell configured");
        };

        let mut cmd = Command::new(program);
        cmd.args(args).arg(command);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(cmd = %command, "running command");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning shell {program:?} for command '{command}'"))?;

        let stdout = child.stdout.take().map(|s| tokio::spawn(forward_lines(s, "stdout")));
        let stderr = child.stderr.take().map(|s| tokio::spawn(forward_lines(s, "stderr")));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for command '{command}'"))?;

        // Drain the pipes so the last lines make it into the log.
        for reader in [stdout, stderr].into_iter().flatten() {
            let _ = reader.await;
        }

        debug!(cmd = %command, exit_code = status.code().unwrap_or(-1), "command exited");
        if !status.success() {
            bail!("command '{command}' failed with {status}");
        }
        Ok(())
    }
}

impl Executor for ShellExecutor {
    fn run_command<'a>(
        &'a self,
        command: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(command, cancel))
    }
}

async fn forward_lines<R>(stream: R, channel: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(channel, "{}", line);
    }
}
