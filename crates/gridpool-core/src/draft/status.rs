// Per-pool draft phase and pick counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a pool, from draft setup through the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    NotInitialized,
    DraftReady,
    DraftActive,
    PreRace,
    RaceActive,
    RaceCompleted,
}

impl Phase {
    /// The stored/wire representation (e.g. `"DRAFT_ACTIVE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotInitialized => "NOT_INITIALIZED",
            Phase::DraftReady => "DRAFT_READY",
            Phase::DraftActive => "DRAFT_ACTIVE",
            Phase::PreRace => "PRE_RACE",
            Phase::RaceActive => "RACE_ACTIVE",
            Phase::RaceCompleted => "RACE_COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_INITIALIZED" => Some(Phase::NotInitialized),
            "DRAFT_READY" => Some(Phase::DraftReady),
            "DRAFT_ACTIVE" => Some(Phase::DraftActive),
            "PRE_RACE" => Some(Phase::PreRace),
            "RACE_ACTIVE" => Some(Phase::RaceActive),
            "RACE_COMPLETED" => Some(Phase::RaceCompleted),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored draft progress for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStatus {
    pub phase: Phase,
    /// 1-based seat in the draft order whose turn it is. This is a snake
    /// position, not a pick counter.
    pub current_pick_index: usize,
    /// Picks made so far. Never exceeds the grid size.
    pub total_picks: usize,
}

impl DraftStatus {
    /// Status written by a draft reset.
    pub fn ready() -> Self {
        DraftStatus {
            phase: Phase::DraftReady,
            current_pick_index: 1,
            total_picks: 0,
        }
    }
}

/// Whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPick {
    pub pick_index: usize,
    pub participant: String,
}

/// Read-only summary for UI consumers. Pick detail is only populated while
/// the draft is active; every other phase reports an empty picker, an empty
/// on-deck list and zero picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStatusView {
    pub phase: Phase,
    pub current_picker: String,
    pub on_deck: Vec<String>,
    pub total_picks: usize,
}

impl DraftStatusView {
    pub fn idle(phase: Phase) -> Self {
        DraftStatusView {
            phase,
            current_picker: String::new(),
            on_deck: Vec::new(),
            total_picks: 0,
        }
    }
}
