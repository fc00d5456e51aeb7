//! Static development server.
//!
//! Serves the bundler's output directory under the public path, falls back
//! to the project's `public/` directory, and answers unknown routes with
//! the history-API fallback pages. Rebuilding and hot reload are the
//! bundler's job; this server only serves what is on disk.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    handler::Handler,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use futures::future::BoxFuture;
use regex::Regex;
use stitch_service::{DevServer, DevServerSettings, Result, ServiceError};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct StaticDevServer;

struct FallbackState {
    output_dir: PathBuf,
    public_path: String,
    rewrites: Vec<(Regex, String)>,
}

impl FallbackState {
    fn from_settings(settings: &DevServerSettings) -> Result<Self> {
        let rewrites = settings
            .history_fallback
            .iter()
            .map(|rewrite| {
                Regex::new(&rewrite.from)
                    .map(|from| (from, rewrite.to.clone()))
                    .map_err(|err| {
                        ServiceError::Server(format!(
                            "invalid history fallback pattern '{}': {err}",
                            rewrite.from
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            output_dir: settings.output_dir.clone(),
            public_path: settings.public_path.clone(),
            rewrites,
        })
    }

    /// File in the output directory answering `path`, if a rewrite matches.
    fn rewrite(&self, path: &str) -> Option<PathBuf> {
        let (_, to) = self.rewrites.iter().find(|(from, _)| from.is_match(path))?;
        let relative = to
            .strip_prefix(self.public_path.as_str())
            .unwrap_or(to)
            .trim_start_matches('/');
        Some(self.output_dir.join(relative))
    }
}

async fn history_fallback(State(state): State<Arc<FallbackState>>, uri: Uri) -> Response {
    let Some(file) = state.rewrite(uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(content) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(content))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => {
            debug!(file = %file.display(), "history fallback target unavailable: {err}");
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
    }
}

/// Mount point for the output directory: the public path without its
/// trailing slash, or `None` for the root.
fn mount_point(public_path: &str) -> Option<String> {
    let trimmed = public_path.trim_end_matches('/');
    if trimmed.is_empty() || !trimmed.starts_with('/') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn router(settings: &DevServerSettings) -> Result<Router> {
    let state = Arc::new(FallbackState::from_settings(settings)?);
    let fallback = history_fallback.with_state(state);

    let files = ServeDir::new(&settings.output_dir)
        .fallback(ServeDir::new(&settings.content_base).fallback(fallback.clone()));

    let router = match mount_point(&settings.public_path) {
        Some(mount) => Router::new().nest_service(&mount, files).fallback_service(fallback),
        None => Router::new().fallback_service(files),
    };
    Ok(if settings.compress {
        router.layer(CompressionLayer::new())
    } else {
        router
    })
}

fn warn_unsupported(settings: &DevServerSettings) {
    if settings.https {
        warn!("https is not supported by the built-in dev server, serving plain http");
    }
    if settings.proxy.is_some() {
        warn!("devServer.proxy is not supported by the built-in dev server and is ignored");
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|err| ServiceError::Server(format!("failed to bind to {host}:{port}: {err}")))
}

#[async_trait]
impl DevServer for StaticDevServer {
    async fn start(&self, settings: DevServerSettings, shutdown: BoxFuture<'static, ()>) -> Result<()> {
        warn_unsupported(&settings);
        let app = router(&settings)?;
        let listener = bind(&settings.host, settings.port).await?;
        debug!(
            host = %settings.host,
            port = settings.port,
            output = %settings.output_dir.display(),
            "dev server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServiceError::Server(err.to_string()))
    }
}
