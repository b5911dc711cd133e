// Standings: rank participants by the average running position of their racers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{Database, Store};
use crate::draft::status::Phase;
use crate::error::Result;
use crate::leaderboard::LeaderboardRow;
use crate::pool::{group_assignments, PoolRoster};

/// A participant's racer with its current leaderboard position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedRacer {
    pub racer_id: String,
    pub racer_name: String,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStanding {
    pub participant: String,
    /// Matched racers, best position first.
    pub racers: Vec<RankedRacer>,
    /// Mean rank of `racers`, rounded to two decimals.
    pub average_rank: f64,
}

/// Stored standings for one pool, best participant first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsSnapshot {
    pub updated_at: DateTime<Utc>,
    pub standings: Vec<ParticipantStanding>,
}

/// Rank every participant in `roster` against `leaderboard`.
///
/// Racers missing from the leaderboard are ignored, and a participant with
/// no racer on the leaderboard is left out entirely. Lower averages rank
/// higher; equal averages fall back to participant name.
pub fn rank_participants(
    roster: &PoolRoster,
    leaderboard: &[LeaderboardRow],
) -> Vec<ParticipantStanding> {
    let ranks: HashMap<&str, u32> = leaderboard
        .iter()
        .map(|row| (row.racer_id.as_str(), row.rank))
        .collect();

    let mut standings: Vec<ParticipantStanding> = roster
        .iter()
        .filter_map(|(participant, racers)| {
            let mut ranked: Vec<RankedRacer> = racers
                .iter()
                .filter_map(|racer| {
                    ranks.get(racer.racer_id.as_str()).map(|&rank| RankedRacer {
                        racer_id: racer.racer_id.clone(),
                        racer_name: racer.racer_name.clone(),
                        rank,
                    })
                })
                .collect();
            if ranked.is_empty() {
                return None;
            }
            ranked.sort_by(|a, b| {
                a.rank
                    .cmp(&b.rank)
                    .then_with(|| a.racer_id.cmp(&b.racer_id))
            });

            let total: u64 = ranked.iter().map(|r| u64::from(r.rank)).sum();
            let average_rank = round2(total as f64 / ranked.len() as f64);
            Some(ParticipantStanding {
                participant: participant.clone(),
                racers: ranked,
                average_rank,
            })
        })
        .collect();

    standings.sort_by(|a, b| {
        a.average_rank
            .total_cmp(&b.average_rank)
            .then_with(|| a.participant.cmp(&b.participant))
    });
    standings
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn compute_in(store: &Store<'_>, pool_id: i64) -> Result<Vec<ParticipantStanding>> {
    let roster = group_assignments(store.assignments(pool_id)?);
    let leaderboard = store.leaderboard()?;
    Ok(rank_participants(&roster, &leaderboard))
}

/// Standings for the pool from the current assignments and leaderboard,
/// without storing them.
pub fn compute_standings(db: &Database, pool_id: i64) -> Result<Vec<ParticipantStanding>> {
    db.scope(|store| compute_in(store, pool_id))
}

/// Recompute the pool's standings and overwrite its stored snapshot.
///
/// Safe to repeat: the snapshot is replaced, never appended to.
pub fn persist_standings(db: &Database, pool_id: i64) -> Result<StandingsSnapshot> {
    let snapshot = db.scope(|store| -> Result<StandingsSnapshot> {
        let snapshot = StandingsSnapshot {
            updated_at: Utc::now(),
            standings: compute_in(store, pool_id)?,
        };
        store.replace_standings(pool_id, &snapshot)?;
        Ok(snapshot)
    })?;
    debug!(
        "Persisted standings for pool {} ({} participants)",
        pool_id,
        snapshot.standings.len()
    );
    Ok(snapshot)
}

/// The pool's last stored snapshot. `None` means standings were never
/// computed, which differs from an empty snapshot.
pub fn read_standings(db: &Database, pool_id: i64) -> Result<Option<StandingsSnapshot>> {
    db.scope(|store| -> Result<Option<StandingsSnapshot>> { Ok(store.standings(pool_id)?) })
}

/// Persist standings for every pool past its draft that has no snapshot.
///
/// Covers a crash between a draft completing and its first snapshot being
/// written. Returns the pools that were repaired.
pub fn repair_missing_standings(db: &Database) -> Result<Vec<i64>> {
    let missing = db.scope(|store| -> Result<Vec<i64>> {
        let mut missing = Vec::new();
        for phase in [Phase::PreRace, Phase::RaceActive, Phase::RaceCompleted] {
            for pool_id in store.pools_in_phase(phase)? {
                if store.standings(pool_id)?.is_none() {
                    missing.push(pool_id);
                }
            }
        }
        Ok(missing)
    })?;

    for &pool_id in &missing {
        persist_standings(db, pool_id)?;
        info!("Repaired missing standings for pool {}", pool_id);
    }
    Ok(missing)
}
