// Draft engine: per-pool phase transitions, pick submission, and snake advancement.
//
// Every public operation runs inside one `Database::scope`, so its reads and
// writes commit or roll back together.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::db::{Database, Store};
use crate::draft::order::{validate_order, DraftSlot};
use crate::draft::snake::{on_deck, SnakeCursor};
use crate::draft::status::{CurrentPick, DraftStatus, DraftStatusView, Phase};
use crate::error::{Error, Result};
use crate::pool::Assignment;
use crate::standings::persist_standings;

/// Upcoming pickers shown in the status view unless configured otherwise.
pub const DEFAULT_ON_DECK_COUNT: usize = 7;

/// Draft progress after one advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    pub current_pick_index: usize,
    pub total_picks: usize,
    /// This advance made the final pick and moved the pool to `PRE_RACE`.
    pub draft_complete: bool,
}

// ---------------------------------------------------------------------------
// Setup and phase transitions
// ---------------------------------------------------------------------------

/// Install a new draft order for the pool and return it to `DRAFT_READY`.
///
/// Clears the pool's assignments and standings.
pub fn reset_draft(db: &Database, pool_id: i64, order: &[DraftSlot]) -> Result<()> {
    let order = validate_order(order)?;

    db.scope(|store| -> Result<()> {
        if store.pool(pool_id)?.is_none() {
            return Err(Error::UnknownPool(pool_id));
        }
        store.clear_assignments(pool_id)?;
        store.clear_standings(pool_id)?;
        store.replace_draft_order(pool_id, &order)?;
        store.put_draft_status(pool_id, &DraftStatus::ready())?;
        Ok(())
    })?;

    info!(
        "Draft reset for pool {} with {} participants",
        pool_id,
        order.len()
    );
    Ok(())
}

/// `DRAFT_READY → DRAFT_ACTIVE`.
pub fn start_draft(db: &Database, pool_id: i64) -> Result<()> {
    transition(db, pool_id, Phase::DraftReady, Phase::DraftActive)
}

/// `PRE_RACE → RACE_ACTIVE`.
pub fn start_race(db: &Database, pool_id: i64) -> Result<()> {
    transition(db, pool_id, Phase::PreRace, Phase::RaceActive)
}

/// `RACE_ACTIVE → RACE_COMPLETED`.
pub fn stop_race(db: &Database, pool_id: i64) -> Result<()> {
    transition(db, pool_id, Phase::RaceActive, Phase::RaceCompleted)
}

fn transition(db: &Database, pool_id: i64, from: Phase, to: Phase) -> Result<()> {
    db.scope(|store| -> Result<()> {
        let status = store.draft_status(pool_id)?;
        let phase = status.map_or(Phase::NotInitialized, |s| s.phase);
        match status {
            Some(status) if status.phase == from => {
                store.put_draft_status(pool_id, &DraftStatus { phase: to, ..status })?;
                Ok(())
            }
            _ => Err(Error::NotReady { pool_id, phase }),
        }
    })?;

    info!("Pool {} moved {} -> {}", pool_id, from, to);
    Ok(())
}

// ---------------------------------------------------------------------------
// Picks
// ---------------------------------------------------------------------------

/// Whose turn it is in the pool's draft.
pub fn current_pick(db: &Database, pool_id: i64) -> Result<CurrentPick> {
    db.scope(|store| current_pick_in(store, pool_id))
}

fn current_pick_in(store: &Store<'_>, pool_id: i64) -> Result<CurrentPick> {
    let status = store
        .draft_status(pool_id)?
        .ok_or(Error::EmptyOrder { pool_id })?;
    let order = store.draft_order(pool_id)?;
    if order.is_empty() {
        return Err(Error::EmptyOrder { pool_id });
    }

    let index = status.current_pick_index;
    let slot = index
        .checked_sub(1)
        .and_then(|i| order.get(i))
        .ok_or(Error::CorruptState {
            pool_id,
            index,
            participants: order.len(),
        })?;

    Ok(CurrentPick {
        pick_index: index,
        participant: slot.name.clone(),
    })
}

/// Assign `racer_id` to the participant whose turn it is, then advance.
///
/// Returns `Ok(false)`, changing nothing, when the racer is not on the grid
/// or is already taken in this pool. When the pick completes the draft the
/// pool's standings are persisted in a separate transaction; if that fails
/// the pick still stands and [`persist_standings`] can be rerun.
pub fn submit_pick(db: &Database, pool_id: i64, racer_id: &str) -> Result<bool> {
    let outcome = db.scope(|store| -> Result<Option<(String, AdvanceOutcome)>> {
        let status = store
            .draft_status(pool_id)?
            .ok_or(Error::NotReady {
                pool_id,
                phase: Phase::NotInitialized,
            })?;
        if status.phase != Phase::DraftActive {
            return Err(Error::NotReady {
                pool_id,
                phase: status.phase,
            });
        }

        let pick = current_pick_in(store, pool_id)?;
        let Some(seat) = store.grid_seat(racer_id)? else {
            debug!("Pool {}: racer {} is not on the grid", pool_id, racer_id);
            return Ok(None);
        };
        if store.is_assigned(pool_id, racer_id)? {
            debug!("Pool {}: racer {} is already taken", pool_id, racer_id);
            return Ok(None);
        }

        let assignment = Assignment {
            participant: pick.participant.clone(),
            racer_id: seat.racer_id,
            racer_name: seat.racer_name,
        };
        if !store.insert_assignment(pool_id, &assignment)? {
            return Ok(None);
        }

        let outcome = advance_in(store, pool_id)?;
        Ok(outcome.map(|o| (pick.participant, o)))
    })?;

    let Some((participant, outcome)) = outcome else {
        return Ok(false);
    };
    info!(
        "Pool {}: {} took racer {} (pick {})",
        pool_id, participant, racer_id, outcome.total_picks
    );

    if outcome.draft_complete {
        complete_draft(db, pool_id);
    }
    Ok(true)
}

/// Move the pool to the next pick without recording an assignment.
///
/// Returns `Ok(None)` when the pool has no participants.
pub fn advance(db: &Database, pool_id: i64) -> Result<Option<AdvanceOutcome>> {
    let outcome = db.scope(|store| advance_in(store, pool_id))?;
    if let Some(outcome) = outcome {
        debug!(
            "Pool {} advanced to seat {} after {} picks",
            pool_id, outcome.current_pick_index, outcome.total_picks
        );
        if outcome.draft_complete {
            complete_draft(db, pool_id);
        }
    }
    Ok(outcome)
}

fn advance_in(store: &Store<'_>, pool_id: i64) -> Result<Option<AdvanceOutcome>> {
    let status = store
        .draft_status(pool_id)?
        .ok_or(Error::EmptyOrder { pool_id })?;
    let participants = store.draft_order(pool_id)?.len();
    let max_picks = store.grid_size()?;

    if status.total_picks >= max_picks {
        return Err(Error::DraftComplete { pool_id });
    }

    let cursor = SnakeCursor {
        current_pick_index: status.current_pick_index,
        total_picks: status.total_picks,
    };
    let Some(next) = cursor.advance(participants) else {
        return Ok(None);
    };

    let draft_complete = next.total_picks >= max_picks;
    let phase = if draft_complete {
        seed_leaderboard_unless_raced(store, pool_id)?;
        Phase::PreRace
    } else {
        status.phase
    };

    store.put_draft_status(
        pool_id,
        &DraftStatus {
            phase,
            current_pick_index: next.current_pick_index,
            total_picks: next.total_picks,
        },
    )?;

    Ok(Some(AdvanceOutcome {
        current_pick_index: next.current_pick_index,
        total_picks: next.total_picks,
        draft_complete,
    }))
}

/// Copy the grid into the shared leaderboard as the pre-race running order.
///
/// Skipped when another pool is racing or has finished its race and the
/// cache already holds rows, since those rows are that pool's live or final
/// order.
fn seed_leaderboard_unless_raced(store: &Store<'_>, pool_id: i64) -> Result<()> {
    let mut raced = store.pools_in_phase(Phase::RaceActive)?;
    raced.extend(store.pools_in_phase(Phase::RaceCompleted)?);

    if !raced.is_empty() && store.leaderboard_len()? > 0 {
        warn!(
            "Pool {} finished its draft while pools {:?} hold race results; \
             leaving the leaderboard as is",
            pool_id, raced
        );
        return Ok(());
    }

    let seeded = store.seed_leaderboard(Utc::now())?;
    debug!("Seeded leaderboard with {} grid rows", seeded);
    Ok(())
}

/// Post-commit step of the final pick.
fn complete_draft(db: &Database, pool_id: i64) {
    info!("Draft complete for pool {}; phase is now {}", pool_id, Phase::PreRace);
    if let Err(e) = persist_standings(db, pool_id) {
        error!(
            "Draft for pool {} completed but its standings were not saved: {}",
            pool_id, e
        );
    }
}

// ---------------------------------------------------------------------------
// Read-only views
// ---------------------------------------------------------------------------

/// Phase, current picker, and upcoming pickers for the pool.
///
/// Picker fields are only filled in while the draft is active.
pub fn draft_status_view(
    db: &Database,
    pool_id: i64,
    on_deck_count: usize,
) -> Result<DraftStatusView> {
    db.scope(|store| -> Result<DraftStatusView> {
        let Some(status) = store.draft_status(pool_id)? else {
            return Ok(DraftStatusView::idle(Phase::NotInitialized));
        };
        if status.phase != Phase::DraftActive {
            return Ok(DraftStatusView::idle(status.phase));
        }

        let pick = current_pick_in(store, pool_id)?;
        let names: Vec<String> = store
            .draft_order(pool_id)?
            .into_iter()
            .map(|slot| slot.name)
            .collect();
        let max_picks = store.grid_size()?;

        Ok(DraftStatusView {
            phase: status.phase,
            current_picker: pick.participant,
            on_deck: on_deck(&names, status.total_picks, on_deck_count, max_picks),
            total_picks: status.total_picks,
        })
    })
}

/// The pool's draft order sorted by position.
pub fn draft_order(db: &Database, pool_id: i64) -> Result<Vec<DraftSlot>> {
    db.scope(|store| -> Result<Vec<DraftSlot>> { Ok(store.draft_order(pool_id)?) })
}

// ---------------------------------------------------------------------------
// Global reset
// ---------------------------------------------------------------------------

type ResetStep = fn(&Store<'_>) -> anyhow::Result<()>;

/// Wipe every pool, draft, and cached result. The grid is kept.
///
/// Each table is cleared in its own transaction, in order. On failure the
/// earlier steps stay applied and the error is returned; running it again
/// finishes the job.
pub fn reset_all(db: &Database) -> Result<()> {
    let steps: [(&str, ResetStep); 6] = [
        ("assignments", |s| s.clear_all_assignments()),
        ("draft status", |s| s.clear_draft_statuses()),
        ("draft order", |s| s.clear_draft_orders()),
        ("leaderboard", |s| s.clear_leaderboard()),
        ("standings", |s| s.clear_all_standings()),
        ("pools", |s| s.clear_pools()),
    ];

    for (name, step) in steps {
        if let Err(e) = db.scope(step) {
            warn!("Reset stopped while clearing {}: {:#}", name, e);
            return Err(Error::Store(e));
        }
        info!("Reset: cleared {}", name);
    }
    Ok(())
}
