use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use traitor_core::TraitorConfig;
use traitor_executor::{ExecOptions, ProcessExecutor, ScriptExecutor};
use traitor_scheduler::JobStore;

mod app;
mod http;
mod ws;

#[derive(Parser)]
#[command(name = "traitor-gateway")]
#[command(about = "Job scheduler with live script debugging")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $TRAITOR_CONFIG or ~/.traitor/traitor.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override gateway.port
    #[arg(long)]
    port: Option<u16>,

    /// Override gateway.bind
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "traitor_gateway=info,traitor_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > TRAITOR_CONFIG env > ~/.traitor/traitor.toml
    let config_path = cli.config.or_else(|| std::env::var("TRAITOR_CONFIG").ok());
    let mut config = TraitorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TraitorConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }

    let db_path = config.database.path.clone();
    info!(path = %db_path, "opening SQLite database");
    let conn = traitor_scheduler::db::open(Path::new(&db_path))?;
    let store = Arc::new(JobStore::new(conn)?);

    let process = ProcessExecutor::new(ExecOptions::from(&config.executor));
    let opts = process.options();
    info!(
        interpreter = %opts.interpreter,
        timeout = ?opts.timeout,
        grace_period = ?opts.grace_period,
        max_line_chars = opts.max_line_chars,
        "script executor ready"
    );
    let executor: Arc<dyn ScriptExecutor> = Arc::new(process);

    let state = Arc::new(app::AppState::new(config, store, executor));
    let router = app::build_router(state.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler_task = if state.config.scheduler.enabled {
        let scheduler = Arc::clone(&state.scheduler);
        Some(tokio::spawn(async move { scheduler.run(shutdown_rx).await }))
    } else {
        info!("scheduler disabled by config, jobs will only run via debug sessions");
        None
    };

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.port)
        .parse()?;
    info!(
        git_sha = env!("TRAITOR_GIT_SHA"),
        "Traitor gateway listening on {}", addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal scheduler to stop, which cancels its in-flight runs
    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    let sessions = state.debug.cancel_all();
    info!(sessions, "shutdown complete");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
