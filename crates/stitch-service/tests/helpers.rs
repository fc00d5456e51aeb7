//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use stitch_service::stitch_chain::ResolvedConfig;
use stitch_service::stitch_config::{Environment, TEST_FLAG};
use stitch_service::{
    BuildOutcome, Bundler, CompilerHandle, DevServer, DevServerSettings, Reporter, Result,
    ServiceBuilder,
};
use tempfile::TempDir;

/// A project directory with a manifest and an entry file.
pub fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "demo", "version": "1.0.0" }"#,
    )
    .expect("write package.json");
    fs::create_dir_all(dir.path().join("src")).expect("create src");
    fs::write(dir.path().join("src/main.js"), "console.log('hi')\n").expect("write main.js");
    dir
}

pub fn test_env() -> Environment {
    Environment::from_iter([(TEST_FLAG, "true")])
}

/// Builder with the test environment and no plugin discovery surprises.
pub fn builder(dir: &Path) -> ServiceBuilder {
    ServiceBuilder::new(dir).environment(test_env())
}

pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

/// Records every configuration it is asked to compile and reports success.
#[derive(Clone, Default)]
pub struct FakeBundler {
    pub compiled: Arc<Mutex<Vec<(Value, bool)>>>,
    pub fail: bool,
}

impl FakeBundler {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_config(&self) -> Value {
        let compiled = self.compiled.lock().unwrap();
        compiled.last().expect("nothing compiled").0.clone()
    }
}

#[async_trait]
impl Bundler for FakeBundler {
    fn name(&self) -> &str {
        "fake"
    }

    fn version(&self) -> Option<String> {
        Some("1.0.0".into())
    }

    async fn compile(
        &self,
        config: &ResolvedConfig,
        _env: &Environment,
        watch: bool,
    ) -> Result<CompilerHandle> {
        self.compiled
            .lock()
            .unwrap()
            .push((config.value().clone(), watch));

        let outcome = if self.fail {
            BuildOutcome::Failed {
                errors: vec!["Module not found: ./missing".into()],
            }
        } else {
            BuildOutcome::Success {
                duration: Some(Duration::from_millis(5)),
                warnings: Vec::new(),
            }
        };

        if !watch {
            return Ok(CompilerHandle::finished(outcome));
        }
        let (mut events, handle) = CompilerHandle::channel();
        tokio::spawn(async move {
            events.emit(outcome);
            events.stopped().await;
        });
        Ok(handle)
    }
}

/// Serves until shut down or until a short grace period ends.
#[derive(Clone, Default)]
pub struct FakeDevServer {
    pub settings: Arc<Mutex<Option<DevServerSettings>>>,
}

#[async_trait]
impl DevServer for FakeDevServer {
    async fn start(&self, settings: DevServerSettings, shutdown: BoxFuture<'static, ()>) -> Result<()> {
        *self.settings.lock().unwrap() = Some(settings);
        tokio::select! {
            _ = shutdown => {}
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
        Ok(())
    }
}

/// Captures command output instead of printing it.
#[derive(Clone, Default)]
pub struct CapturingReporter {
    pub printed: Arc<Mutex<Vec<String>>>,
    pub status: Arc<Mutex<Vec<String>>>,
}

impl CapturingReporter {
    pub fn printed(&self) -> String {
        self.printed.lock().unwrap().join("\n")
    }

    pub fn status(&self) -> String {
        self.status.lock().unwrap().join("\n")
    }
}

impl Reporter for CapturingReporter {
    fn info(&self, message: &str) {
        self.status.lock().unwrap().push(message.to_string());
    }

    fn success(&self, message: &str) {
        self.status.lock().unwrap().push(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.status.lock().unwrap().push(message.to_string());
    }

    fn print(&self, output: &str) {
        self.printed.lock().unwrap().push(output.to_string());
    }
}
