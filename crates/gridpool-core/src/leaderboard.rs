// Leaderboard cache and the background worker that refreshes it during races.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::draft::status::Phase;
use crate::error::{Error, Result};
use crate::standings::persist_standings;

/// How often racing pools are refreshed unless configured otherwise.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// One cached running-order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub racer_id: String,
    /// Current running position, 1 = leader.
    pub rank: u32,
    pub status: String,
    pub laps: u32,
    pub updated_at: DateTime<Utc>,
}

/// A row as reported by a leaderboard feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub racer_id: String,
    pub rank: u32,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub laps: u32,
}

fn default_status() -> String {
    "Unknown".to_string()
}

impl LeaderboardEntry {
    pub fn stamp(self, updated_at: DateTime<Utc>) -> LeaderboardRow {
        LeaderboardRow {
            racer_id: self.racer_id,
            rank: self.rank,
            status: self.status,
            laps: self.laps,
            updated_at,
        }
    }
}

/// Where live running orders come from.
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    /// The full current running order.
    async fn fetch(&self) -> anyhow::Result<Vec<LeaderboardEntry>>;
}

/// Reads the running order from a JSON file holding an array of entries.
/// Whatever process scrapes the timing feed rewrites the file in place.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LeaderboardSource for JsonFileSource {
    async fn fetch(&self) -> anyhow::Result<Vec<LeaderboardEntry>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read leaderboard file {}", self.path.display()))?;
        let entries = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse leaderboard file {}", self.path.display()))?;
        Ok(entries)
    }
}

/// What one refresh cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Pools whose standings were recomputed.
    pub pools: Vec<i64>,
    /// Leaderboard rows written.
    pub rows: usize,
}

/// The cached running order, best position first.
pub fn read_leaderboard(db: &Database) -> Result<Vec<LeaderboardRow>> {
    db.scope(|store| -> Result<Vec<LeaderboardRow>> { Ok(store.leaderboard()?) })
}

/// Refresh the leaderboard and the standings of every racing pool.
///
/// Does nothing, and never calls `source`, when no pool is in
/// `RACE_ACTIVE`. The database lock is not held while fetching.
pub async fn refresh_once(db: &Database, source: &dyn LeaderboardSource) -> Result<RefreshReport> {
    let racing = db.scope(|store| -> Result<Vec<i64>> {
        Ok(store.pools_in_phase(Phase::RaceActive)?)
    })?;
    if racing.is_empty() {
        return Ok(RefreshReport::default());
    }

    let entries = source.fetch().await.map_err(Error::Source)?;
    let now = Utc::now();
    let rows: Vec<LeaderboardRow> = entries.into_iter().map(|e| e.stamp(now)).collect();
    db.scope(|store| -> Result<()> { Ok(store.replace_leaderboard(&rows)?) })?;

    for &pool_id in &racing {
        persist_standings(db, pool_id)?;
    }

    Ok(RefreshReport {
        pools: racing,
        rows: rows.len(),
    })
}

/// Run [`refresh_once`] every `interval` until `shutdown` yields or closes.
///
/// A failed cycle is logged and the loop carries on with the next tick. A
/// zero interval disables the worker.
pub async fn run_refresh_loop(
    db: Arc<Database>,
    source: Arc<dyn LeaderboardSource>,
    interval: Duration,
    mut shutdown: mpsc::Receiver<()>,
) {
    if interval.is_zero() {
        warn!("Leaderboard refresh interval is zero; refresh worker disabled");
        return;
    }

    info!("Leaderboard refresh worker started (every {:?})", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                match refresh_once(&db, source.as_ref()).await {
                    Ok(report) if report.pools.is_empty() => {
                        debug!("No racing pools; skipped leaderboard refresh");
                    }
                    Ok(report) => {
                        info!(
                            "Refreshed {} leaderboard rows for pools {:?}",
                            report.rows, report.pools
                        );
                    }
                    Err(e) => {
                        error!("Leaderboard refresh failed: {}", e);
                    }
                }
                let elapsed = started.elapsed();
                if elapsed > interval {
                    warn!(
                        "Leaderboard refresh took {:?}, longer than the {:?} interval",
                        elapsed, interval
                    );
                }
            }

            _ = shutdown.recv() => {
                info!("Leaderboard refresh worker shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::draft::status::DraftStatus;
    use crate::pool::Assignment;

    struct FakeSource {
        entries: Vec<LeaderboardEntry>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(entries: Vec<LeaderboardEntry>) -> Self {
            Self {
                entries,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LeaderboardSource for FakeSource {
        async fn fetch(&self) -> anyhow::Result<Vec<LeaderboardEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl LeaderboardSource for BrokenSource {
        async fn fetch(&self) -> anyhow::Result<Vec<LeaderboardEntry>> {
            anyhow::bail!("timing feed unreachable")
        }
    }

    fn entry(id: &str, rank: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            racer_id: id.to_string(),
            rank,
            status: "Running".to_string(),
            laps: 10,
        }
    }

    fn set_phase(db: &Database, pool_id: i64, phase: Phase) {
        db.scope(|s| {
            s.put_draft_status(
                pool_id,
                &DraftStatus {
                    phase,
                    ..DraftStatus::ready()
                },
            )
        })
        .unwrap();
    }

    #[test]
    fn entry_defaults_missing_fields() {
        let entries: Vec<LeaderboardEntry> =
            serde_json::from_str(r#"[{"racer_id": "7", "rank": 3}]"#).unwrap();
        assert_eq!(entries[0].status, "Unknown");
        assert_eq!(entries[0].laps, 0);
    }

    #[tokio::test]
    async fn idle_when_no_pool_is_racing() {
        let db = Database::open(":memory:").unwrap();
        set_phase(&db, 1, Phase::PreRace);
        let source = FakeSource::new(vec![entry("7", 1)]);

        let report = refresh_once(&db, &source).await.unwrap();
        assert_eq!(report, RefreshReport::default());
        assert_eq!(source.calls(), 0);
        assert!(read_leaderboard(&db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn refreshes_only_racing_pools() {
        let db = Database::open(":memory:").unwrap();
        set_phase(&db, 1, Phase::RaceActive);
        set_phase(&db, 2, Phase::PreRace);
        db.scope(|s| {
            for pool_id in [1, 2] {
                s.insert_assignment(
                    pool_id,
                    &Assignment {
                        participant: "Alice".into(),
                        racer_id: "7".into(),
                        racer_name: "Driver 7".into(),
                    },
                )?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
        let source = FakeSource::new(vec![entry("7", 2), entry("9", 1)]);

        let report = refresh_once(&db, &source).await.unwrap();
        assert_eq!(report.pools, vec![1]);
        assert_eq!(report.rows, 2);

        let board = read_leaderboard(&db).unwrap();
        assert_eq!(board[0].racer_id, "9");

        let standings = db.scope(|s| s.standings(1)).unwrap().unwrap();
        assert_eq!(standings.standings[0].average_rank, 2.0);
        assert!(db.scope(|s| s.standings(2)).unwrap().is_none());
    }

    #[tokio::test]
    async fn source_failure_leaves_cache_untouched() {
        let db = Database::open(":memory:").unwrap();
        set_phase(&db, 1, Phase::RaceActive);
        let before = FakeSource::new(vec![entry("7", 1)]);
        refresh_once(&db, &before).await.unwrap();

        let err = refresh_once(&db, &BrokenSource).await.unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert_eq!(read_leaderboard(&db).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_file_source_reads_entries() {
        let path = std::env::temp_dir().join(format!(
            "gridpool_leaderboard_test_{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"racer_id": "7", "rank": 1, "status": "Running", "laps": 3}]"#,
        )
        .unwrap();

        let entries = JsonFileSource::new(&path).fetch().await.unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(entries, vec![LeaderboardEntry {
            racer_id: "7".into(),
            rank: 1,
            status: "Running".into(),
            laps: 3,
        }]);
    }

    #[tokio::test]
    async fn json_file_source_missing_file_is_an_error() {
        let source = JsonFileSource::new("/nonexistent/leaderboard.json");
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_shutdown() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        set_phase(&db, 1, Phase::RaceActive);
        let source = Arc::new(FakeSource::new(vec![entry("7", 1)]));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = tokio::spawn(run_refresh_loop(
            db.clone(),
            source.clone(),
            DEFAULT_REFRESH_INTERVAL,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(source.calls() >= 2);

        shutdown_tx.send(()).await.unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn zero_interval_returns_immediately() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let source: Arc<dyn LeaderboardSource> = Arc::new(FakeSource::new(vec![]));
        let (_tx, rx) = mpsc::channel(1);
        run_refresh_loop(db, source, Duration::ZERO, rx).await;
    }
}
