//! `serve`: compile in watch mode and serve the result with hot reload.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use stitch_chain::{ChainableConfig, ResolvedConfig};
use stitch_config::{posix_join, Page, ProjectOptions};
use tokio::sync::oneshot;
use tracing::debug;

use crate::api::{CommandOptions, ExtensionApi};
use crate::args::CommandArgs;
use crate::bundler::{BuildOutcome, DevServerSettings, HistoryRewrite};
use crate::context::ServiceContext;
use crate::error::Result;
use crate::plugin::Plugin;
use crate::urls::{
    find_free_port, in_container, is_absolute_url, prepare_urls, with_protocol, ServerUrls,
};
use crate::validate::APP_TARGET;

use super::shutdown::shutdown_signal;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const SOCKET_PATH: &str = "/sockjs-node";
const GLOBAL_OBJECT: &str = "(typeof self !== 'undefined' ? self : this)";

#[derive(Debug, Default, Clone, Copy)]
pub struct ServeCommand;

impl Plugin for ServeCommand {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        let command = CommandOptions::new()
            .description("start development server")
            .usage("stitch serve [options] [entry]")
            .flag("--open", "open browser on server start")
            .flag("--copy", "copy url to clipboard on server start")
            .flag("--stdin", "close when stdin ends")
            .flag("--mode", "specify env mode (default: development)")
            .flag(
                "--host",
                format!(
                    "specify host (default: {})",
                    options.dev_server.host.as_deref().unwrap_or(DEFAULT_HOST)
                ),
            )
            .flag(
                "--port",
                format!(
                    "specify port (default: {})",
                    options.dev_server.port.unwrap_or(DEFAULT_PORT)
                ),
            )
            .flag("--https", "use https (default: false)")
            .flag("--public", "specify the public network URL for the HMR client")
            .flag("--skip-plugins", "comma-separated list of plugin names to skip for this run");

        api.command("serve", command, serve);
        Ok(())
    }

    fn default_modes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("serve".to_string(), "development".to_string())])
    }
}

/// Settings only wanted while developing.
fn apply_dev_tweaks(chain: &mut ChainableConfig, progress: bool) -> stitch_chain::Result<()> {
    chain
        .set("devtool", "cheap-module-eval-source-map")?
        .set("output.globalObject", GLOBAL_OBJECT)?;
    chain
        .plugin("hmr")
        .use_factory("webpack/lib/HotModuleReplacementPlugin", Vec::new());
    if progress {
        chain
            .plugin("progress")
            .use_factory("webpack/lib/ProgressPlugin", Vec::new());
    }
    Ok(())
}

/// Fallback rewrites for history-mode routing: each page answers requests
/// under its own name, longest names first, everything else gets
/// `index.html`.
pub fn history_api_fallback_rewrites(
    public_path: &str,
    pages: &BTreeMap<String, Page>,
) -> Vec<HistoryRewrite> {
    let mut names: Vec<&String> = pages.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()));

    names
        .into_iter()
        .map(|name| HistoryRewrite {
            from: format!("^/{}", regex::escape(name)),
            to: posix_join(public_path, &pages[name].filename(name)),
        })
        .chain(std::iter::once(HistoryRewrite {
            from: ".".into(),
            to: posix_join(public_path, "index.html"),
        }))
        .collect()
}

/// Client entries injected in front of every entry point: the live reload
/// socket client and the hot module replacement runtime.
pub fn dev_clients(socket_query: &str, hot_only: bool) -> Vec<String> {
    let hot = if hot_only {
        "webpack/hot/only-dev-server"
    } else {
        "webpack/hot/dev-server"
    };
    vec![
        format!("webpack-dev-server/client{socket_query}"),
        hot.to_string(),
    ]
}

fn prepend_to_entries(config: &mut ResolvedConfig, clients: &[String]) {
    let clients: Vec<Value> = clients.iter().cloned().map(Value::String).collect();
    let prepend = |entry: &mut Value| {
        let existing = match entry.take() {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        *entry = Value::Array(clients.iter().cloned().chain(existing).collect());
    };

    let Some(map) = config.value_mut().as_object_mut() else {
        return;
    };
    match map.get_mut("entry") {
        Some(Value::Object(entries)) => entries.values_mut().for_each(prepend),
        Some(entry) => prepend(entry),
        None => {}
    }
}

/// Resolved listen address and public URL of the server.
#[derive(Debug, Clone, PartialEq)]
struct Listen {
    host: String,
    port: u16,
    https: bool,
    public_url: Option<String>,
}

/// Flags win over environment variables, which win over options and the
/// configuration's own `devServer` section.
fn listen_settings(ctx: &ServiceContext, args: &CommandArgs, config: &ResolvedConfig) -> Listen {
    let options = &ctx.options().dev_server;
    let configured = config.value().get("devServer");
    let configured_str = |key: &str| {
        configured
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let https = args.get_bool("https")
        || options.https.unwrap_or(false)
        || configured
            .and_then(|c| c.get("https"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
    let host = args
        .get_str("host")
        .or_else(|| ctx.environment().get("HOST").map(str::to_string))
        .or_else(|| options.host.clone())
        .or_else(|| configured_str("host"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = args
        .get_u16("port")
        .or_else(|| ctx.environment().get("PORT").and_then(|p| p.parse().ok()))
        .or(options.port)
        .or_else(|| {
            configured
                .and_then(|c| c.get("port"))
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let protocol = if https { "https" } else { "http" };
    let public_url = args
        .get_str("public")
        .or_else(|| options.public.clone())
        .or_else(|| configured_str("public"))
        .map(|url| with_protocol(protocol, &url));

    Listen {
        host,
        port,
        https,
        public_url,
    }
}

async fn serve(ctx: ServiceContext, args: CommandArgs, _raw: Vec<String>) -> Result<Value> {
    let reporter = ctx.reporter();
    reporter.info("Starting development server...");

    let production = ctx.environment().is_production();
    let container = in_container();
    let options = ctx.options().clone();

    let mut chain = ctx.resolve_chainable_config()?;
    if !production {
        let progress = !ctx.environment().is_test() && options.dev_server.progress;
        apply_dev_tweaks(&mut chain, progress)?;
    }
    let mut config = ctx.resolve_configuration(Some(chain))?;

    if let Some(entry) = args.first() {
        let entry = ctx.resolve(entry);
        if let Some(map) = config.value_mut().as_object_mut() {
            map.insert("entry".into(), json!({ "app": [entry.to_string_lossy()] }));
        }
    }
    ctx.validate(&config, APP_TARGET)?;

    let listen = listen_settings(&ctx, &args, &config);
    let port = find_free_port(&listen.host, listen.port).await?;
    let protocol = if listen.https { "https" } else { "http" };
    let pathname = if is_absolute_url(&options.public_path) {
        "/"
    } else {
        options.public_path.as_str()
    };
    let urls = prepare_urls(protocol, &listen.host, port, pathname);

    if !production {
        let socket_query = match (&listen.public_url, container) {
            (Some(public), _) => format!("?{public}{SOCKET_PATH}"),
            (None, true) => String::new(),
            (None, false) => format!(
                "?{protocol}://{}:{port}{SOCKET_PATH}",
                urls.lan_url_for_config.as_deref().unwrap_or("localhost")
            ),
        };
        prepend_to_entries(&mut config, &dev_clients(&socket_query, options.dev_server.hot_only));
    }

    let mut settings = DevServerSettings {
        host: listen.host.clone(),
        port,
        https: listen.https,
        public_path: options.public_path.clone(),
        content_base: ctx.resolve("public"),
        output_dir: ctx.resolve(&options.output_dir),
        hot: !production,
        compress: production,
        history_fallback: history_api_fallback_rewrites(&options.public_path, &options.pages),
        proxy: options.dev_server.proxy.clone(),
        extra: Map::new(),
    };
    for configure in ctx.dev_server_fns() {
        configure(&mut settings);
    }
    debug!(?settings, "dev server settings");

    let bundler = ctx.bundler()?;
    let dev_server = ctx.dev_server()?;
    let mut compiler = bundler.compile(&config, ctx.environment(), true).await?;

    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let mut server = dev_server.start(
        settings,
        Box::pin(async move {
            let _ = server_stopped.await;
        }),
    );
    let signal = shutdown_signal(args.get_bool("stdin"));
    tokio::pin!(signal);

    let mut stop_server = Some(stop_server);
    let mut compiling = true;
    let mut first_compile = true;
    loop {
        tokio::select! {
            result = &mut server => {
                compiler.stop();
                result?;
                break;
            }
            _ = &mut signal, if stop_server.is_some() => {
                reporter.info("Shutting down development server...");
                if let Some(stop) = stop_server.take() {
                    let _ = stop.send(());
                }
            }
            outcome = compiler.next_outcome(), if compiling => match outcome {
                Some(BuildOutcome::Success { warnings, .. }) => {
                    for warning in &warnings {
                        reporter.warning(warning);
                    }
                    report_running(
                        &ctx,
                        &urls,
                        listen.public_url.as_deref(),
                        container,
                        first_compile,
                        production,
                    );
                    first_compile = false;
                }
                Some(BuildOutcome::Failed { errors }) => {
                    reporter.warning(&format!("Failed to compile.\n\n{}", errors.join("\n\n")));
                }
                None => compiling = false,
            },
        }
    }

    Ok(json!({ "url": urls.local_url_for_browser }))
}

fn report_running(
    ctx: &ServiceContext,
    urls: &ServerUrls,
    public_url: Option<&str>,
    container: bool,
    first_compile: bool,
    production: bool,
) {
    let reporter = ctx.reporter();
    let mut lines = vec![
        String::new(),
        "  App running at:".to_string(),
        format!("  - Local:   {}", urls.local_url_for_terminal),
    ];

    let network = match public_url {
        Some(url) if url.ends_with('/') => Some(url.to_string()),
        Some(url) => Some(format!("{url}/")),
        None => urls.lan_url_for_terminal.clone(),
    };
    if !container {
        lines.push(format!(
            "  - Network: {}",
            network.as_deref().unwrap_or("unavailable")
        ));
    } else {
        lines.push(String::new());
        lines.push("  It seems you are running inside a container.".to_string());
        lines.push(
            "  Access the dev server via http://localhost:<your container's external mapped port>"
                .to_string(),
        );
    }
    reporter.info(&lines.join("\n"));

    if first_compile {
        if production {
            reporter.info("  App is served in production mode.\n  Note this is for preview or E2E testing only.");
        } else {
            reporter.info("  Note that the development build is not optimized.\n  To create a production build, run stitch build.");
        }
    } else if ctx.environment().is_test() {
        reporter.info("App updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_config::PageConfig;

    #[test]
    fn rewrites_prefer_longer_page_names() {
        let mut pages = BTreeMap::new();
        pages.insert("a".to_string(), Page::Entry("src/a.js".into()));
        pages.insert(
            "admin".to_string(),
            Page::Config(PageConfig {
                entry: "src/admin.js".into(),
                template: None,
                filename: Some("manage.html".into()),
                title: None,
                chunks: None,
            }),
        );

        let rewrites = history_api_fallback_rewrites("/app/", &pages);
        assert_eq!(
            rewrites,
            [
                HistoryRewrite {
                    from: "^/admin".into(),
                    to: "/app/manage.html".into()
                },
                HistoryRewrite {
                    from: "^/a".into(),
                    to: "/app/a.html".into()
                },
                HistoryRewrite {
                    from: ".".into(),
                    to: "/app/index.html".into()
                },
            ]
        );
    }

    #[test]
    fn dev_clients_follow_hot_only() {
        assert_eq!(
            dev_clients("?http://localhost:8080/sockjs-node", false),
            [
                "webpack-dev-server/client?http://localhost:8080/sockjs-node",
                "webpack/hot/dev-server"
            ]
        );
        assert_eq!(dev_clients("", true)[1], "webpack/hot/only-dev-server");
    }

    #[test]
    fn clients_are_prepended_to_every_entry() {
        let mut config = ResolvedConfig::new(
            json!({ "entry": { "app": ["./src/main.js"], "admin": "./src/admin.js" } }),
            Vec::new(),
        );
        prepend_to_entries(&mut config, &["client".to_string()]);
        assert_eq!(
            config.value()["entry"],
            json!({ "app": ["client", "./src/main.js"], "admin": ["client", "./src/admin.js"] })
        );
    }

    #[test]
    fn dev_tweaks() {
        let mut chain = ChainableConfig::new();
        apply_dev_tweaks(&mut chain, false).unwrap();
        assert_eq!(chain.get("devtool"), Some(&json!("cheap-module-eval-source-map")));
        assert!(chain.has_plugin("hmr"));
        assert!(!chain.has_plugin("progress"));
    }
}
