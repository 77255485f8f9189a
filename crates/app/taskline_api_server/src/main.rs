//! Taskline API server binary.
//!
//! Serves the HTTP API and the `/ws` real-time channel. Stops on Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use taskline_api::AppState;
use taskline_api::config::ApiConfig;
use taskline_core::store::Persistence;
use taskline_core::store::memory::InMemoryStore;
use taskline_core::store::postgres::PgStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "taskline_api_server", about = "Taskline API server")]
struct Args {
    /// Port to listen on on 127.0.0.1. Overrides `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/taskline"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep all data in process memory instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,taskline_api=debug,taskline_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.pg_connection_url = args.database_url.clone();
    if let Some(port) = args.port {
        config.bind_addr = format!("127.0.0.1:{port}");
    }

    info!(
        bind_addr = %config.bind_addr,
        in_memory = args.in_memory,
        rotation = ?config.refresh_rotation,
        "starting taskline_api_server"
    );

    let store: Arc<dyn Persistence> = if args.in_memory {
        warn!("using in-memory store; data is lost on exit");
        Arc::new(InMemoryStore::new())
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&args.database_url)
            .await?;

        info!("running database migrations");
        taskline_core::migrate::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    let state = AppState::new(config.clone(), store);

    let shutdown = CancellationToken::new();
    let sweep = state
        .refresh_registry()
        .spawn_sweep_task(config.refresh_sweep_interval, shutdown.clone());

    let app = taskline_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API and websocket listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            info!("ctrl-c received, shutting down");
            shutdown.cancel();
        }
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    shutdown.cancel();
    let _ = sweep.await;
    result?;

    info!("server stopped");
    Ok(())
}
