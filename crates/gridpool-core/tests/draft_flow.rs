// Integration tests for gridpool-core.
//
// These drive a pool through its whole lifecycle using only the public API:
// pool creation, grid import, the snake draft, completion into PRE_RACE,
// live leaderboard refreshes, and the global reset.

use std::path::Path;

use async_trait::async_trait;
use gridpool_core::db::Database;
use gridpool_core::draft::engine::{self, DEFAULT_ON_DECK_COUNT};
use gridpool_core::draft::order::DraftSlot;
use gridpool_core::draft::status::Phase;
use gridpool_core::grid::{self, GridSeat};
use gridpool_core::leaderboard::{self, LeaderboardEntry, LeaderboardSource};
use gridpool_core::pool;
use gridpool_core::standings;
use gridpool_core::Error;

// ===========================================================================
// Test helpers
// ===========================================================================

/// Car numbers in starting order.
const GRID: [&str; 8] = ["1", "10", "12", "5", "3", "9", "26", "7"];

fn grid_seats() -> Vec<GridSeat> {
    GRID.iter()
        .zip(1u32..)
        .map(|(id, position)| GridSeat {
            racer_id: id.to_string(),
            racer_name: format!("Driver {id}"),
            starting_position: position,
        })
        .collect()
}

/// Draft order submitted out of position order.
fn shuffled_order() -> Vec<DraftSlot> {
    vec![
        DraftSlot::new("Carol", 3),
        DraftSlot::new("Alice", 1),
        DraftSlot::new("Dave", 4),
        DraftSlot::new("Bob", 2),
    ]
}

struct FixedSource(Vec<LeaderboardEntry>);

#[async_trait]
impl LeaderboardSource for FixedSource {
    async fn fetch(&self) -> anyhow::Result<Vec<LeaderboardEntry>> {
        Ok(self.0.clone())
    }
}

fn entry(racer_id: &str, rank: u32) -> LeaderboardEntry {
    LeaderboardEntry {
        racer_id: racer_id.to_string(),
        rank,
        status: "Running".to_string(),
        laps: 50,
    }
}

/// A pool with the grid loaded and the draft started.
fn drafting_pool() -> (Database, i64) {
    let db = Database::open(":memory:").unwrap();
    let created = pool::create_pool(&db, "Family", 4).unwrap();
    grid::replace_grid(&db, &grid_seats()).unwrap();
    engine::reset_draft(&db, created.id, &shuffled_order()).unwrap();
    engine::start_draft(&db, created.id).unwrap();
    (db, created.id)
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn full_pool_lifecycle() {
    let (db, pool_id) = drafting_pool();

    let view =
        engine::draft_status_view(&db, pool_id, DEFAULT_ON_DECK_COUNT).unwrap();
    assert_eq!(view.phase, Phase::DraftActive);
    assert_eq!(view.current_picker, "Alice");
    assert_eq!(
        view.on_deck,
        vec!["Bob", "Carol", "Dave", "Dave", "Carol", "Bob", "Alice"]
    );

    // Every pick takes the next car in starting order.
    let expected = ["Alice", "Bob", "Carol", "Dave", "Dave", "Carol", "Bob", "Alice"];
    for (pick, (racer_id, participant)) in GRID.iter().zip(expected).enumerate() {
        let current = engine::current_pick(&db, pool_id).unwrap();
        assert_eq!(current.participant, participant, "pick {pick}");

        if pick == 3 {
            let taken = engine::submit_pick(&db, pool_id, "1").unwrap();
            let unknown = engine::submit_pick(&db, pool_id, "99").unwrap();
            assert!(!taken, "already taken");
            assert!(!unknown, "not on grid");
        }
        assert!(engine::submit_pick(&db, pool_id, racer_id).unwrap());
    }

    // Completion: PRE_RACE, grid seeded as the running order, standings saved.
    let view =
        engine::draft_status_view(&db, pool_id, DEFAULT_ON_DECK_COUNT).unwrap();
    assert_eq!(view.phase, Phase::PreRace);
    assert!(view.current_picker.is_empty());
    assert_eq!(view.total_picks, 0);

    let board = leaderboard::read_leaderboard(&db).unwrap();
    assert_eq!(board.len(), GRID.len());
    assert!(board
        .iter()
        .all(|row| row.status == "Not Started" && row.laps == 0));

    let snapshot = standings::read_standings(&db, pool_id).unwrap().unwrap();
    let names: Vec<&str> = snapshot
        .standings
        .iter()
        .map(|s| s.participant.as_str())
        .collect();
    // Every participant averages 4.5 on the seeded grid.
    assert_eq!(names, vec!["Alice", "Bob", "Carol", "Dave"]);
    assert!(snapshot.standings.iter().all(|s| s.average_rank == 4.5));

    // No second completion.
    assert!(matches!(
        engine::submit_pick(&db, pool_id, "7"),
        Err(Error::NotReady { .. })
    ));
    assert!(matches!(
        engine::advance(&db, pool_id),
        Err(Error::DraftComplete { .. })
    ));
    assert_eq!(leaderboard::read_leaderboard(&db).unwrap().len(), GRID.len());

    // Not racing yet: refresh is idle.
    let source = FixedSource(vec![
        entry("5", 1),
        entry("3", 2),
        entry("12", 3),
        entry("9", 4),
        entry("10", 5),
        entry("26", 6),
        entry("1", 7),
    ]);
    let report = leaderboard::refresh_once(&db, &source).await.unwrap();
    assert!(report.pools.is_empty());

    engine::start_race(&db, pool_id).unwrap();
    let report = leaderboard::refresh_once(&db, &source).await.unwrap();
    assert_eq!(report.pools, vec![pool_id]);
    assert_eq!(report.rows, 7);

    let snapshot = standings::read_standings(&db, pool_id).unwrap().unwrap();
    let table: Vec<(&str, f64)> = snapshot
        .standings
        .iter()
        .map(|s| (s.participant.as_str(), s.average_rank))
        .collect();
    assert_eq!(
        table,
        vec![("Dave", 1.5), ("Carol", 3.5), ("Bob", 5.5), ("Alice", 7.0)]
    );
    // Car 7 is not on the feed, so only car 1 counts for Alice.
    assert_eq!(snapshot.standings[3].racers.len(), 1);

    engine::stop_race(&db, pool_id).unwrap();
    let report = leaderboard::refresh_once(&db, &source).await.unwrap();
    assert!(report.pools.is_empty());

    engine::reset_all(&db).unwrap();
    engine::reset_all(&db).unwrap();
    assert!(pool::list_pools(&db).unwrap().is_empty());
    assert!(standings::read_standings(&db, pool_id).unwrap().is_none());
    assert_eq!(grid::grid_seats(&db).unwrap().len(), GRID.len());
}

#[test]
fn pools_draft_independently() {
    let (db, family) = drafting_pool();
    let office = pool::create_pool(&db, "Office", 2).unwrap().id;
    engine::reset_draft(
        &db,
        office,
        &[DraftSlot::new("Erin", 1), DraftSlot::new("Frank", 2)],
    )
    .unwrap();
    engine::start_draft(&db, office).unwrap();

    // The same car can go in both pools.
    assert!(engine::submit_pick(&db, family, "10").unwrap());
    assert!(engine::submit_pick(&db, office, "10").unwrap());

    let family_grid = grid::grid_status(&db, family).unwrap();
    let office_grid = grid::grid_status(&db, office).unwrap();
    assert_eq!(family_grid[1].taken_by.as_deref(), Some("Alice"));
    assert_eq!(office_grid[1].taken_by.as_deref(), Some("Erin"));
    assert!(family_grid[0].taken_by.is_none());

    assert_eq!(engine::current_pick(&db, family).unwrap().participant, "Bob");
    assert_eq!(
        engine::current_pick(&db, office).unwrap().participant,
        "Frank"
    );
}

#[test]
fn roster_round_trip_through_pool_api() {
    let (db, pool_id) = drafting_pool();
    for racer_id in ["10", "12", "1"] {
        assert!(engine::submit_pick(&db, pool_id, racer_id).unwrap());
    }

    let roster = pool::load_pool(&db, pool_id).unwrap();
    assert_eq!(roster.len(), 3);
    assert_eq!(roster["Carol"][0].racer_id, "1");

    let computed = standings::compute_standings(&db, pool_id).unwrap();
    // Nothing on the leaderboard before the draft completes.
    assert!(computed.is_empty());
}

// ===========================================================================
// Grid import
// ===========================================================================

#[test]
fn shipped_grid_csv_imports() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../data/grid.csv");
    let seats = grid::load_grid_csv(&path).expect("shipped grid should load");
    assert!(!seats.is_empty());
    assert!(seats
        .windows(2)
        .all(|w| w[0].starting_position < w[1].starting_position));

    let db = Database::open(":memory:").unwrap();
    grid::replace_grid(&db, &seats).unwrap();
    assert_eq!(grid::grid_seats(&db).unwrap(), seats);
}
