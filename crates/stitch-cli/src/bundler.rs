//! Bundler backed by an external executable.
//!
//! The resolved configuration is written as JSON to
//! `node_modules/.cache/stitch/config.json` and the executable is started
//! with `--config <file>` (plus `--watch`). Every line it prints on stdout
//! that parses as a build report is turned into a [`BuildOutcome`]:
//!
//! ```json
//! { "type": "done", "errors": [], "warnings": ["..."], "durationMs": 812 }
//! ```
//!
//! Without any report, a single build succeeds when the process exits with
//! status 0, and fails with its stderr otherwise.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use stitch_service::stitch_chain::ResolvedConfig;
use stitch_service::stitch_config::Environment;
use stitch_service::{BuildOutcome, Bundler, CompilerEvents, CompilerHandle, Result, ServiceError};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const CONFIG_FILE: &str = "node_modules/.cache/stitch/config.json";

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Report {
    #[serde(rename_all = "camelCase")]
    Done {
        #[serde(default)]
        errors: Vec<String>,
        #[serde(default)]
        warnings: Vec<String>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
}

impl From<Report> for BuildOutcome {
    fn from(report: Report) -> Self {
        match report {
            Report::Done { errors, .. } if !errors.is_empty() => BuildOutcome::Failed { errors },
            Report::Done {
                warnings,
                duration_ms,
                ..
            } => BuildOutcome::Success {
                duration: duration_ms.map(Duration::from_millis),
                warnings,
            },
        }
    }
}

fn parse_report(line: &str) -> Option<BuildOutcome> {
    serde_json::from_str::<Report>(line.trim()).ok().map(Into::into)
}

#[derive(Debug, Clone)]
pub struct ProcessBundler {
    program: String,
}

impl ProcessBundler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn write_config(&self, config: &ResolvedConfig) -> Result<PathBuf> {
        let context = config
            .value()
            .get("context")
            .and_then(|c| c.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = context.join(CONFIG_FILE);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(config.value())?).await?;
        Ok(path)
    }

    fn spawn(&self, config_path: &Path, env: &Environment, watch: bool) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .arg("--config")
            .arg(config_path)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if watch {
            command.arg("--watch");
        }
        debug!(program = %self.program, config = %config_path.display(), watch, "starting bundler");
        command.spawn().map_err(|err| {
            ServiceError::Bundler(format!(
                "failed to start '{}': {err}\n\nHint: Install the bundler or pass another executable with --bundler",
                self.program
            ))
        })
    }
}

/// Forward reports until the process exits or the handle asks to stop.
async fn drive(mut child: Child, mut events: CompilerEvents, started: Instant) {
    let Some(stdout) = child.stdout.take() else {
        return;
    };
    let mut stderr = child.stderr.take();
    let mut lines = BufReader::new(stdout).lines();
    let mut reported = false;

    loop {
        tokio::select! {
            _ = events.stopped() => {
                if let Err(err) = child.kill().await {
                    warn!("failed to stop bundler: {err}");
                }
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_report(&line) {
                    Some(outcome) => {
                        reported = true;
                        if !events.emit(outcome) {
                            return;
                        }
                    }
                    None => debug!(target: "stitch_cli::bundler", "{line}"),
                },
                Ok(None) | Err(_) => break,
            },
        }
    }

    let status = child.wait().await;
    if reported {
        return;
    }

    let mut stderr_text = String::new();
    if let Some(stderr) = stderr.as_mut() {
        let _ = stderr.read_to_string(&mut stderr_text).await;
    }
    let outcome = match status {
        Ok(status) if status.success() => BuildOutcome::Success {
            duration: Some(started.elapsed()),
            warnings: Vec::new(),
        },
        Ok(status) => BuildOutcome::Failed {
            errors: vec![if stderr_text.trim().is_empty() {
                format!("bundler exited with {status}")
            } else {
                stderr_text.trim().to_string()
            }],
        },
        Err(err) => BuildOutcome::Failed {
            errors: vec![err.to_string()],
        },
    };
    events.emit(outcome);
}

#[async_trait]
impl Bundler for ProcessBundler {
    fn name(&self) -> &str {
        &self.program
    }

    async fn compile(
        &self,
        config: &ResolvedConfig,
        env: &Environment,
        watch: bool,
    ) -> Result<CompilerHandle> {
        let config_path = self.write_config(config).await?;
        let child = self.spawn(&config_path, env, watch)?;
        let (events, handle) = CompilerHandle::channel();
        tokio::spawn(drive(child, events, Instant::now()));
        Ok(handle)
    }
}
