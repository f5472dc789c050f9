//! RepoViz HTTP server.
//!
//! Exposes the repository fetcher and the visualization pipeline as JSON
//! endpoints for the web client.

mod error;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{debug, info};

use repoviz_core::VisualizeService;
use repoviz_github::GithubClient;
use repoviz_shared::{load_config, load_config_from};

use routes::AppState;

/// RepoViz server: repository digests and architecture diagrams over HTTP.
#[derive(Parser)]
#[command(name = "repoviz-server", version, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.repoviz/repoviz.toml).
    #[arg(long, env = "REPOVIZ_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `[server] bind`.
    #[arg(long, env = "REPOVIZ_BIND")]
    bind: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match args.verbose {
        0 => "repoviz=info,tower_http=info",
        1 => "repoviz=debug,tower_http=debug",
        _ => "repoviz=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match args.log_format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&args);

    let config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let service = Arc::new(VisualizeService::from_config(&config)?);
    let github = Arc::new(GithubClient::from_config(&config.github)?);

    // Periodic sweep on top of the store's threshold sweep.
    let sweeper = Arc::clone(&service);
    let interval = config.quota.window().max(std::time::Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sweeper.gate().sweep();
            debug!(removed, "quota sweep");
        }
    });

    let app = routes::build_router(AppState { service, github });

    let bind = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, model = %config.openai.model, profile = ?config.pipeline.profile, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
