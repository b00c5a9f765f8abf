// Draft Together server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log file, or stderr on request)
// 2. Load config
// 3. Open database
// 4. Load the stored champion catalog
// 5. Create mpsc channels
// 6. Spawn catalog refresh task
// 7. Spawn WebSocket server task
// 8. Run the app loop until Ctrl+C
// 9. Cleanup on exit

use std::sync::Arc;

use draft_together_server::app;
use draft_together_server::catalog;
use draft_together_server::config;
use draft_together_server::db;
use draft_together_server::ws_server;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Set to any value to log to stderr instead of `logs/draft-together.log`.
const LOG_STDERR_ENV: &str = "DRAFT_TOGETHER_LOG_STDERR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft Together server starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: listening on {}, catalog source {:?}",
        config.server.bind_addr(),
        config.catalog.source
    );
    info!(
        "Front end addresses: ws={} http={} image domains={:?}",
        config.client.ws_base_address,
        config.client.http_base_address,
        config.client.image_domains
    );

    // 3. Open database
    let db = Arc::new(db::Database::open(&config.db_path).context("failed to open database")?);
    info!(
        "Database opened at {} ({} saved drafts)",
        config.db_path,
        db.draft_count()?
    );

    // 4. Load the stored catalog; the refresh task replaces it when a newer
    // game version is published.
    let stored = catalog::load_stored(&db).context("failed to load stored catalog")?;
    if stored.is_empty() {
        warn!("No champions stored yet, updates are rejected until the first refresh");
    } else {
        info!(
            "Loaded {} champions (version {})",
            stored.len(),
            stored.version().unwrap_or("unknown")
        );
    }
    if let Some(checked) = db.last_catalog_check()? {
        info!("Catalog last checked at {checked}");
    }

    // 5. Create mpsc channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (catalog_tx, catalog_rx) = mpsc::channel(4);

    // 6. Spawn catalog refresh task
    let source = catalog::source_from_config(&config.catalog);
    let catalog_handle = tokio::spawn(catalog::run_refresh_loop(
        source,
        Arc::clone(&db),
        config.catalog.refresh_interval(),
        config.catalog.positions_refresh_interval(),
        catalog_tx,
    ));

    // 7. Spawn WebSocket server task
    let bind_addr = config.server.bind_addr();
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(&bind_addr, ws_tx).await {
            error!("WebSocket server error on {bind_addr}: {e:#}");
        }
    });

    // 8. Run the app loop until Ctrl+C
    let app_state = app::AppState::new(Arc::clone(&db), stored);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };
    info!("Application ready");
    app::run(
        ws_rx,
        catalog_rx,
        shutdown,
        config.persistence.flush_interval(),
        app_state,
    )
    .await?;

    // 9. Cleanup: the server and refresh loops run forever
    ws_handle.abort();
    catalog_handle.abort();

    info!("Draft Together server shut down cleanly");
    Ok(())
}

/// Initialize tracing to a log file under `logs/`, or to stderr when
/// `DRAFT_TOGETHER_LOG_STDERR` is set.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("draft_together=info,warn"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    if std::env::var_os(LOG_STDERR_ENV).is_some() {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("failed to set tracing subscriber")?;
        return Ok(());
    }

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("draft-together.log"))?;

    let subscriber = builder.with_writer(log_file).with_ansi(false).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
