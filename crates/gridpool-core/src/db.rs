// SQLite persistence layer for pools, the grid, drafts, and standings.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::draft::order::DraftSlot;
use crate::draft::status::{DraftStatus, Phase};
use crate::grid::{GridSeat, GridSeatStatus};
use crate::leaderboard::LeaderboardRow;
use crate::pool::{Assignment, Pool};
use crate::standings::{ParticipantStanding, StandingsSnapshot};

/// Status written into the leaderboard cache when a draft completes and the
/// grid is copied over as the initial running order.
pub const NOT_STARTED_STATUS: &str = "Not Started";

/// SQLite-backed store. Every operation acquires the connection through
/// [`Database::scope`] and releases it before returning.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pools (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                name              TEXT NOT NULL,
                participant_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS grid_seats (
                racer_id          TEXT PRIMARY KEY,
                racer_name        TEXT NOT NULL,
                starting_position INTEGER NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS draft_order (
                pool_id          INTEGER NOT NULL,
                participant_name TEXT NOT NULL,
                pick_position    INTEGER NOT NULL,
                PRIMARY KEY (pool_id, pick_position)
            );

            CREATE TABLE IF NOT EXISTS draft_status (
                pool_id      INTEGER PRIMARY KEY,
                phase        TEXT NOT NULL,
                current_pick INTEGER NOT NULL,
                total_picks  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                pool_id          INTEGER NOT NULL,
                participant_name TEXT NOT NULL,
                racer_id         TEXT NOT NULL,
                racer_name       TEXT NOT NULL,
                UNIQUE (pool_id, racer_id)
            );

            CREATE TABLE IF NOT EXISTS leaderboard (
                racer_id       TEXT NOT NULL,
                rank_position  INTEGER NOT NULL,
                status         TEXT NOT NULL,
                laps_completed INTEGER NOT NULL,
                updated_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS standings_snapshots (
                pool_id        INTEGER PRIMARY KEY,
                updated_at     TEXT NOT NULL,
                standings_json TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_assignments_pool ON assignments(pool_id);",
        )
        .context("failed to create assignments index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// The write lock is taken up front, so a read-then-write sequence inside
    /// `f` cannot interleave with another writer. Commits when `f` returns
    /// `Ok`; any `Err` drops the transaction, which rolls it back.
    pub fn scope<T, E>(
        &self,
        f: impl FnOnce(&Store<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin transaction")?;
        let value = f(&Store { conn: &tx })?;
        tx.commit().context("failed to commit transaction")?;
        Ok(value)
    }
}

/// Typed access to the tables, valid for the lifetime of one transaction.
pub struct Store<'a> {
    conn: &'a Connection,
}

impl Store<'_> {
    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    pub fn insert_pool(&self, name: &str, participant_count: u32) -> Result<Pool> {
        let id: i64 = self
            .conn
            .query_row(
                "INSERT INTO pools (name, participant_count) VALUES (?1, ?2) RETURNING id",
                params![name, participant_count],
                |row| row.get(0),
            )
            .context("failed to insert pool")?;
        Ok(Pool {
            id,
            name: name.to_string(),
            participant_count,
        })
    }

    pub fn pools(&self) -> Result<Vec<Pool>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, participant_count FROM pools ORDER BY id ASC")
            .context("failed to prepare pools query")?;
        let pools = stmt
            .query_map([], |row| {
                Ok(Pool {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    participant_count: row.get(2)?,
                })
            })
            .context("failed to query pools")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pool rows")?;
        Ok(pools)
    }

    pub fn pool(&self, pool_id: i64) -> Result<Option<Pool>> {
        self.conn
            .query_row(
                "SELECT id, name, participant_count FROM pools WHERE id = ?1",
                params![pool_id],
                |row| {
                    Ok(Pool {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        participant_count: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("failed to load pool")
    }

    pub fn clear_pools(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM pools", [])
            .context("failed to delete pools")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grid
    // ------------------------------------------------------------------

    /// Replace the event grid wholesale.
    pub fn replace_grid(&self, seats: &[GridSeat]) -> Result<()> {
        self.conn
            .execute("DELETE FROM grid_seats", [])
            .context("failed to clear grid")?;
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO grid_seats (racer_id, racer_name, starting_position)
                 VALUES (?1, ?2, ?3)",
            )
            .context("failed to prepare grid insert")?;
        for seat in seats {
            stmt.execute(params![seat.racer_id, seat.racer_name, seat.starting_position])
                .with_context(|| format!("failed to insert grid seat {}", seat.racer_id))?;
        }
        Ok(())
    }

    /// All grid seats ordered by starting position.
    pub fn grid_seats(&self) -> Result<Vec<GridSeat>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT racer_id, racer_name, starting_position
                 FROM grid_seats ORDER BY starting_position ASC",
            )
            .context("failed to prepare grid query")?;
        let seats = stmt
            .query_map([], |row| {
                Ok(GridSeat {
                    racer_id: row.get(0)?,
                    racer_name: row.get(1)?,
                    starting_position: row.get(2)?,
                })
            })
            .context("failed to query grid")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map grid rows")?;
        Ok(seats)
    }

    pub fn grid_seat(&self, racer_id: &str) -> Result<Option<GridSeat>> {
        self.conn
            .query_row(
                "SELECT racer_id, racer_name, starting_position
                 FROM grid_seats WHERE racer_id = ?1",
                params![racer_id],
                |row| {
                    Ok(GridSeat {
                        racer_id: row.get(0)?,
                        racer_name: row.get(1)?,
                        starting_position: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("failed to load grid seat")
    }

    /// Number of draftable seats, i.e. the maximum number of picks per pool.
    pub fn grid_size(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM grid_seats", [], |row| row.get(0))
            .context("failed to count grid seats")?;
        Ok(count as usize)
    }

    /// Grid seats joined with this pool's assignments.
    pub fn grid_status(&self, pool_id: i64) -> Result<Vec<GridSeatStatus>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT g.racer_id, g.racer_name, g.starting_position, a.participant_name
                 FROM grid_seats g
                 LEFT JOIN assignments a
                     ON a.racer_id = g.racer_id AND a.pool_id = ?1
                 ORDER BY g.starting_position ASC",
            )
            .context("failed to prepare grid status query")?;
        let seats = stmt
            .query_map(params![pool_id], |row| {
                Ok(GridSeatStatus {
                    seat: GridSeat {
                        racer_id: row.get(0)?,
                        racer_name: row.get(1)?,
                        starting_position: row.get(2)?,
                    },
                    taken_by: row.get(3)?,
                })
            })
            .context("failed to query grid status")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map grid status rows")?;
        Ok(seats)
    }

    // ------------------------------------------------------------------
    // Draft order
    // ------------------------------------------------------------------

    pub fn replace_draft_order(&self, pool_id: i64, order: &[DraftSlot]) -> Result<()> {
        self.conn
            .execute("DELETE FROM draft_order WHERE pool_id = ?1", params![pool_id])
            .context("failed to clear draft order")?;
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO draft_order (pool_id, participant_name, pick_position)
                 VALUES (?1, ?2, ?3)",
            )
            .context("failed to prepare draft order insert")?;
        for slot in order {
            stmt.execute(params![pool_id, slot.name, slot.position])
                .context("failed to insert draft order slot")?;
        }
        Ok(())
    }

    /// The pool's draft order sorted by pick position.
    pub fn draft_order(&self, pool_id: i64) -> Result<Vec<DraftSlot>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT participant_name, pick_position FROM draft_order
                 WHERE pool_id = ?1 ORDER BY pick_position ASC",
            )
            .context("failed to prepare draft order query")?;
        let order = stmt
            .query_map(params![pool_id], |row| {
                Ok(DraftSlot {
                    name: row.get(0)?,
                    position: row.get(1)?,
                })
            })
            .context("failed to query draft order")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft order rows")?;
        Ok(order)
    }

    pub fn clear_draft_orders(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM draft_order", [])
            .context("failed to delete draft orders")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Draft status
    // ------------------------------------------------------------------

    /// Stored status for the pool; `None` means the pool was never drafted.
    pub fn draft_status(&self, pool_id: i64) -> Result<Option<DraftStatus>> {
        let row: Option<(String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT phase, current_pick, total_picks FROM draft_status WHERE pool_id = ?1",
                params![pool_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("failed to load draft status")?;

        row.map(|(phase, current_pick, total_picks)| {
            let phase = Phase::parse(&phase)
                .ok_or_else(|| anyhow!("unknown phase '{phase}' stored for pool {pool_id}"))?;
            Ok(DraftStatus {
                phase,
                current_pick_index: current_pick as usize,
                total_picks: total_picks as usize,
            })
        })
        .transpose()
    }

    pub fn put_draft_status(&self, pool_id: i64, status: &DraftStatus) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO draft_status (pool_id, phase, current_pick, total_picks)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    pool_id,
                    status.phase.as_str(),
                    status.current_pick_index as i64,
                    status.total_picks as i64,
                ],
            )
            .context("failed to save draft status")?;
        Ok(())
    }

    /// Ids of every pool whose stored phase equals `phase`.
    pub fn pools_in_phase(&self, phase: Phase) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT pool_id FROM draft_status WHERE phase = ?1 ORDER BY pool_id ASC")
            .context("failed to prepare phase query")?;
        let ids = stmt
            .query_map(params![phase.as_str()], |row| row.get(0))
            .context("failed to query pools by phase")?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .context("failed to map pool ids")?;
        Ok(ids)
    }

    pub fn clear_draft_statuses(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM draft_status", [])
            .context("failed to delete draft statuses")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    /// Record an assignment. Returns `false` when the racer is already
    /// assigned in this pool (the UNIQUE(pool_id, racer_id) constraint).
    pub fn insert_assignment(&self, pool_id: i64, assignment: &Assignment) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO assignments (pool_id, participant_name, racer_id, racer_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    pool_id,
                    assignment.participant,
                    assignment.racer_id,
                    assignment.racer_name,
                ],
            )
            .context("failed to insert assignment")?;
        Ok(inserted == 1)
    }

    pub fn is_assigned(&self, pool_id: i64, racer_id: &str) -> Result<bool> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM assignments WHERE pool_id = ?1 AND racer_id = ?2)",
                params![pool_id, racer_id],
                |row| row.get(0),
            )
            .context("failed to check assignment existence")?;
        Ok(exists)
    }

    pub fn assignments(&self, pool_id: i64) -> Result<Vec<Assignment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT participant_name, racer_id, racer_name FROM assignments
                 WHERE pool_id = ?1",
            )
            .context("failed to prepare assignments query")?;
        let rows = stmt
            .query_map(params![pool_id], |row| {
                Ok(Assignment {
                    participant: row.get(0)?,
                    racer_id: row.get(1)?,
                    racer_name: row.get(2)?,
                })
            })
            .context("failed to query assignments")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map assignment rows")?;
        Ok(rows)
    }

    pub fn clear_assignments(&self, pool_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM assignments WHERE pool_id = ?1", params![pool_id])
            .context("failed to delete pool assignments")?;
        Ok(())
    }

    pub fn clear_all_assignments(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM assignments", [])
            .context("failed to delete assignments")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Leaderboard cache
    // ------------------------------------------------------------------

    /// Replace every cached leaderboard row.
    pub fn replace_leaderboard(&self, rows: &[LeaderboardRow]) -> Result<()> {
        self.clear_leaderboard()?;
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO leaderboard (racer_id, rank_position, status, laps_completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .context("failed to prepare leaderboard insert")?;
        for row in rows {
            stmt.execute(params![
                row.racer_id,
                row.rank,
                row.status,
                row.laps,
                row.updated_at.to_rfc3339(),
            ])
            .context("failed to insert leaderboard row")?;
        }
        Ok(())
    }

    /// Cached rows ordered by rank.
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT racer_id, rank_position, status, laps_completed, updated_at
                 FROM leaderboard ORDER BY rank_position ASC, racer_id ASC",
            )
            .context("failed to prepare leaderboard query")?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("failed to query leaderboard")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map leaderboard rows")?;

        raw.into_iter()
            .map(|(racer_id, rank, status, laps, updated_at)| {
                Ok(LeaderboardRow {
                    racer_id,
                    rank,
                    status,
                    laps,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    pub fn leaderboard_len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM leaderboard", [], |row| row.get(0))
            .context("failed to count leaderboard rows")?;
        Ok(count as usize)
    }

    /// Copy the grid into the leaderboard as the pre-race running order.
    /// Replaces any existing rows, so seeding twice leaves one row per seat.
    pub fn seed_leaderboard(&self, updated_at: DateTime<Utc>) -> Result<usize> {
        self.clear_leaderboard()?;
        let seeded = self
            .conn
            .execute(
                "INSERT INTO leaderboard (racer_id, rank_position, status, laps_completed, updated_at)
                 SELECT racer_id, starting_position, ?1, 0, ?2 FROM grid_seats",
                params![NOT_STARTED_STATUS, updated_at.to_rfc3339()],
            )
            .context("failed to seed leaderboard from grid")?;
        Ok(seeded)
    }

    pub fn clear_leaderboard(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM leaderboard", [])
            .context("failed to delete leaderboard rows")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Standings snapshots
    // ------------------------------------------------------------------

    /// Overwrite the pool's snapshot.
    pub fn replace_standings(&self, pool_id: i64, snapshot: &StandingsSnapshot) -> Result<()> {
        let json = serde_json::to_string(&snapshot.standings)
            .context("failed to serialize standings")?;
        self.conn
            .execute(
                "DELETE FROM standings_snapshots WHERE pool_id = ?1",
                params![pool_id],
            )
            .context("failed to delete previous standings")?;
        self.conn
            .execute(
                "INSERT INTO standings_snapshots (pool_id, updated_at, standings_json)
                 VALUES (?1, ?2, ?3)",
                params![pool_id, snapshot.updated_at.to_rfc3339(), json],
            )
            .context("failed to insert standings")?;
        Ok(())
    }

    pub fn standings(&self, pool_id: i64) -> Result<Option<StandingsSnapshot>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT updated_at, standings_json FROM standings_snapshots WHERE pool_id = ?1",
                params![pool_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to load standings")?;

        row.map(|(updated_at, json)| {
            let standings: Vec<ParticipantStanding> = serde_json::from_str(&json)
                .context("failed to deserialize standings")?;
            Ok(StandingsSnapshot {
                updated_at: parse_timestamp(&updated_at)?,
                standings,
            })
        })
        .transpose()
    }

    pub fn clear_standings(&self, pool_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM standings_snapshots WHERE pool_id = ?1",
                params![pool_id],
            )
            .context("failed to delete pool standings")?;
        Ok(())
    }

    pub fn clear_all_standings(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM standings_snapshots", [])
            .context("failed to delete standings")?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp '{value}'"))
}
