//! Atrium API server binary.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use atrium_api::config::ApiConfig;
use atrium_core::auth::postgres::PgAuthStore;
use atrium_core::auth::session::SessionManager;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "atrium_api_server", about = "Atrium API server")]
struct Args {
    /// Port to listen on (0 = ephemeral). Overrides `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/atrium"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,atrium_api=debug,atrium_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!(max_connections = args.max_connections, "starting atrium_api_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    atrium_core::migrate::migrate(&pool).await?;

    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        config.bind_addr = format!("127.0.0.1:{port}");
    }
    config.database_url = args.database_url;

    let store = Arc::new(PgAuthStore::new(pool));
    let sessions = SessionManager::new(store.clone(), store, config.codec()?);
    let state = atrium_api::AppState::new(sessions, config.clone());

    let app = atrium_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
