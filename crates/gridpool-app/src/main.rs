// gridpool entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr)
// 2. Load config
// 3. Open database
// 4. Import the event grid if none is stored
// 5. Repair standings left missing by an interrupted draft completion
// 6. Spawn the leaderboard refresh worker
// 7. Wait for Ctrl+C, then shut the worker down

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gridpool_core::config;
use gridpool_core::db::Database;
use gridpool_core::grid;
use gridpool_core::leaderboard::{self, JsonFileSource, LeaderboardSource};
use gridpool_core::standings;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("gridpool starting up");

    // 2. Load config
    let config = config::load_config()
        .context("failed to load configuration")?;
    info!(
        "Config loaded: refresh every {}s, {} on deck",
        config.refresh.interval_secs, config.draft.on_deck_count
    );

    // 3. Open database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
    }
    let db = Database::open(&config.db_path).context("failed to open database")?;
    let db = Arc::new(db);
    info!("Database opened at {}", config.db_path);

    // 4. Event grid
    if let Some(grid_path) = &config.grid.path {
        import_grid(&db, Path::new(grid_path))?;
    }

    // 5. Standings repair
    let repaired = standings::repair_missing_standings(&db)
        .context("failed to repair missing standings")?;
    if !repaired.is_empty() {
        info!("Recomputed standings for pools {:?}", repaired);
    }

    // 6. Refresh worker
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let worker = match &config.refresh.leaderboard_path {
        Some(path) => {
            let source: Arc<dyn LeaderboardSource> = Arc::new(JsonFileSource::new(path));
            Some(tokio::spawn(leaderboard::run_refresh_loop(
                db.clone(),
                source,
                config.refresh.interval(),
                shutdown_rx,
            )))
        }
        None => {
            info!("No leaderboard path configured; refresh worker not started");
            None
        }
    };

    // 7. Run until interrupted
    info!("gridpool ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(()).await;
    if let Some(worker) = worker {
        match tokio::time::timeout(Duration::from_secs(5), worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Refresh worker panicked: {}", e),
            Err(_) => warn!("Refresh worker did not stop within 5s"),
        }
    }

    info!("gridpool shut down cleanly");
    Ok(())
}

/// Store the grid from `path` unless one is already stored.
fn import_grid(db: &Database, path: &Path) -> anyhow::Result<()> {
    let stored = grid::grid_seats(db).context("failed to read stored grid")?;

    if !path.exists() {
        if stored.is_empty() {
            warn!("Grid file {} not found and no grid is stored", path.display());
        }
        return Ok(());
    }

    let seats = grid::load_grid_csv(path).context("failed to load grid")?;
    if stored.is_empty() {
        grid::replace_grid(db, &seats).context("failed to store grid")?;
        info!("Imported {} grid seats from {}", seats.len(), path.display());
    } else if stored != seats {
        warn!(
            "Grid file {} differs from the stored grid; keeping the stored grid",
            path.display()
        );
    }
    Ok(())
}

/// Initialize tracing to stderr, filtered by `RUST_LOG`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridpool=info,gridpool_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
