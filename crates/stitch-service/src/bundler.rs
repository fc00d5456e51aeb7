//! Interfaces to the external bundler and dev server.
//!
//! The service only produces configuration. Compiling it and serving the
//! result is delegated to implementations of [`Bundler`] and [`DevServer`]
//! supplied by the embedder.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use stitch_chain::ResolvedConfig;
use stitch_config::Environment;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Success {
        duration: Option<Duration>,
        warnings: Vec<String>,
    },
    Failed {
        errors: Vec<String>,
    },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success { .. })
    }
}

/// A running compilation.
///
/// Yields one [`BuildOutcome`] per finished build: exactly one for a
/// single build, one per rebuild in watch mode. The stream ends when the
/// compiler stops.
#[derive(Debug)]
pub struct CompilerHandle {
    events: mpsc::UnboundedReceiver<BuildOutcome>,
    stop: Option<oneshot::Sender<()>>,
}

/// Producer side of a [`CompilerHandle`].
pub struct CompilerEvents {
    events: mpsc::UnboundedSender<BuildOutcome>,
    stop: oneshot::Receiver<()>,
}

impl CompilerHandle {
    pub fn channel() -> (CompilerEvents, CompilerHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        (
            CompilerEvents {
                events: events_tx,
                stop: stop_rx,
            },
            CompilerHandle {
                events: events_rx,
                stop: Some(stop_tx),
            },
        )
    }

    /// A handle that reports a single, already known outcome.
    pub fn finished(outcome: BuildOutcome) -> Self {
        let (events, handle) = Self::channel();
        events.emit(outcome);
        handle
    }

    pub async fn next_outcome(&mut self) -> Option<BuildOutcome> {
        self.events.recv().await
    }

    /// Ask the compiler to stop watching.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl CompilerEvents {
    /// Report a finished build. Returns false once nobody is listening.
    pub fn emit(&self, outcome: BuildOutcome) -> bool {
        self.events.send(outcome).is_ok()
    }

    /// Resolves when the handle asked to stop or was dropped.
    pub async fn stopped(&mut self) {
        let _ = (&mut self.stop).await;
    }
}

#[async_trait]
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;

    /// Version reported for cache keys.
    fn version(&self) -> Option<String> {
        None
    }

    async fn compile(
        &self,
        config: &ResolvedConfig,
        env: &Environment,
        watch: bool,
    ) -> Result<CompilerHandle>;
}

/// One history-API fallback rule: requests matching `from` are answered
/// with `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRewrite {
    /// Regular expression source.
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevServerSettings {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub public_path: String,
    /// Directory with static files served as-is.
    pub content_base: PathBuf,
    /// Build output directory.
    pub output_dir: PathBuf,
    pub hot: bool,
    pub compress: bool,
    pub history_fallback: Vec<HistoryRewrite>,
    pub proxy: Option<Value>,
    /// Settings added by plugins for a specific server implementation.
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait DevServer: Send + Sync {
    /// Serve until `shutdown` resolves, then stop accepting connections and
    /// return.
    async fn start(&self, settings: DevServerSettings, shutdown: BoxFuture<'static, ()>)
    -> Result<()>;
}

/// Status output of commands. The default implementation logs.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    /// Command output meant for stdout, e.g. `inspect` results.
    fn print(&self, output: &str);
}

/// Reporter writing command output to stdout and status to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn print(&self, output: &str) {
        println!("{output}");
    }
}
