// School Fees Tracker - Web Server
// Server-rendered pages over the fee reconciliation library

use anyhow::Context;
use rusqlite::Connection;
use school_fees::logging::init_tracing;
use school_fees::web::{router, AppState};
use school_fees::{ensure_bootstrap_admin, setup_database, FeeSchedule, SchoolFeesConfig, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = std::env::args().nth(1).map(PathBuf::from);
    let config = SchoolFeesConfig::load_with_dotenv(config_file.as_deref())
        .context("failed to load configuration")?;

    init_tracing(&config.log.filter)?;

    // Open database
    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
    setup_database(&conn).context("failed to set up schema")?;
    info!(path = %config.database.path.display(), "database ready");

    if ensure_bootstrap_admin(
        &conn,
        &config.bootstrap.admin_username,
        &config.bootstrap.admin_password,
    )? {
        info!(user = %config.bootstrap.admin_username, "bootstrap admin created");
    }

    // Create shared state
    let state = AppState::new(
        conn,
        FeeSchedule::standard(),
        Arc::new(SystemClock),
        config.session_ttl(),
    );

    let static_dir = config.server.static_dir.clone();
    if !static_dir.is_dir() {
        warn!(dir = %static_dir.display(), "static directory missing; pages render unstyled");
    }
    let app = router(state, Some(static_dir.as_path()));

    // Start server
    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "school fees server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
