//! Supervisor server - runs one payload at a time and streams it to the browser.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use nautilus::io::config::load_config;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "nautilus-server")]
#[command(about = "HTTP front end for the single-job payload supervisor")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Config file (defaults apply if it does not exist)
    #[arg(long, default_value = "/etc/nautilus/config.toml")]
    config: PathBuf,

    /// Directory containing UI static files (defaults to <state_dir>/ui)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nautilus_server=info".parse()?)
                .add_directive("nautilus=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)?;
    info!(
        config = %args.config.display(),
        payload_root = %config.payload_root.display(),
        "starting nautilus-server"
    );

    let ui_dir = args
        .ui_dir
        .unwrap_or_else(|| config.state_dir.join("ui"));
    let state = AppState::new(config);

    let mut app: Router = routes::api_router().with_state(state.clone());

    // Serve static UI files if available
    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C after killing the active job, so open streams can finish.
async fn shutdown(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(err = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    let supervisor = state.supervisor.clone();
    match tokio::task::spawn_blocking(move || supervisor.stop()).await {
        Ok(Ok(status)) => info!(?status, "active job stopped"),
        Ok(Err(e)) => warn!(err = %e, "failed to stop active job"),
        Err(e) => warn!(err = %e, "stop task panicked"),
    }
}
