// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent subprocess driver: spawns a headless coding-agent command, reads
//! its stdout as newline-delimited JSON, and turns each line into a
//! [`ContentBlock`]. Agents are expected to speak this schema directly
//! (alias commands wrap whatever native CLI into this contract); a line
//! that doesn't parse as a content block is wrapped as a plain `text`
//! block rather than dropped, so a bare unstructured CLI still streams
//! something useful.

pub mod jsonl;
pub mod process;

use anyhow::Context;
use std::path::Path;
use std::process::Stdio;
use tiflis_protocol::{ContentBlock, ContentBlockKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

pub use process::is_process_alive;

/// Exit status of the agent child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Events streamed out of a running agent subprocess.
#[derive(Debug)]
pub enum AgentEvent {
    Block(ContentBlock),
    Exited(ExitStatus),
}

/// A spawned agent subprocess plus the handle needed to cancel it.
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn `command` in `cwd`, writing `prompt` as a single JSON line on
    /// stdin (`{"prompt": "..."}`) and closing stdin so the agent sees EOF
    /// after its one turn of input.
    pub async fn spawn(command: &[String], cwd: &Path, prompt: &str, env: &[(String, String)]) -> anyhow::Result<Self> {
        let (program, args) = command.split_first().context("agent command must not be empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }
        let mut child = cmd.spawn().context("failed to spawn agent process")?;

        let request = serde_json::json!({ "prompt": prompt }).to_string();
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(request.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
            drop(stdin);
        }

        Ok(Self { child })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Drive the subprocess to completion, emitting one [`AgentEvent`] per
    /// stdout line and a final `Exited` event. Consumes `self` because the
    /// child's stdout handle can only be taken once.
    pub async fn run(mut self, events_tx: mpsc::Sender<AgentEvent>) -> anyhow::Result<()> {
        let mut stdout = self.child.stdout.take().context("stdout already taken")?;
        let mut stderr = self.child.stderr.take();
        let mut parser = jsonl::JsonlParser::new();
        let mut buf = vec![0u8; 8192];
        let mut sequence = 0u64;

        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            for value in parser.feed(&buf[..n]) {
                sequence += 1;
                let block = block_from_value(value, sequence);
                if events_tx.send(AgentEvent::Block(block)).await.is_err() {
                    break;
                }
            }
        }

        if let Some(stderr) = stderr.take() {
            drop(stderr);
        }

        let status = self.child.wait().await?;
        let exit = ExitStatus {
            code: status.code(),
            signal: std::os::unix::process::ExitStatusExt::signal(&status),
        };
        let _ = events_tx.send(AgentEvent::Exited(exit)).await;
        Ok(())
    }

    /// Terminate the subprocess: SIGTERM, then SIGKILL if still alive after
    /// a short grace period.
    pub async fn cancel(&mut self) {
        if let Some(pid) = self.pid() {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            if is_process_alive(pid) {
                let _ = self.child.kill().await;
            }
        } else {
            let _ = self.child.kill().await;
        }
    }
}

fn block_from_value(value: serde_json::Value, sequence: u64) -> ContentBlock {
    let id = format!("b{sequence}");
    match serde_json::from_value::<ContentBlock>(value.clone()) {
        Ok(block) => block,
        Err(_) => {
            let text = value.get("text").and_then(|t| t.as_str()).map(str::to_owned).unwrap_or_else(|| value.to_string());
            ContentBlock::new(id, ContentBlockKind::Text { text })
        }
    }
}
