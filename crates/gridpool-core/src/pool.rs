// Pool registry and participant → racer assignments.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::error::{Error, Result};

/// An independent competition: its own participants, draft, and standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: i64,
    pub name: String,
    /// Expected number of participants, as entered when the pool was created.
    pub participant_count: u32,
}

/// A racer owned by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedRacer {
    pub racer_id: String,
    pub racer_name: String,
}

/// One stored row of the assignments table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub participant: String,
    pub racer_id: String,
    pub racer_name: String,
}

/// Participant name → racers, as loaded from the store.
pub type PoolRoster = BTreeMap<String, Vec<AssignedRacer>>;

/// Register a new pool.
pub fn create_pool(db: &Database, name: &str, participant_count: u32) -> Result<Pool> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidPool("pool name must not be blank".into()));
    }

    let pool = db.scope(|store| -> Result<Pool> {
        Ok(store.insert_pool(name, participant_count)?)
    })?;
    info!(
        "Created pool {} '{}' for {} participants",
        pool.id, pool.name, pool.participant_count
    );
    Ok(pool)
}

/// All registered pools, oldest first.
pub fn list_pools(db: &Database) -> Result<Vec<Pool>> {
    db.scope(|store| -> Result<Vec<Pool>> { Ok(store.pools()?) })
}

/// Replace every assignment in the pool with `roster`.
///
/// Fails without changing anything if a racer appears more than once.
pub fn save_pool(db: &Database, pool_id: i64, roster: &PoolRoster) -> Result<()> {
    db.scope(|store| -> Result<()> {
        store.clear_assignments(pool_id)?;
        for (participant, racers) in roster {
            for racer in racers {
                let assignment = Assignment {
                    participant: participant.clone(),
                    racer_id: racer.racer_id.clone(),
                    racer_name: racer.racer_name.clone(),
                };
                if !store.insert_assignment(pool_id, &assignment)? {
                    return Err(Error::InvalidPool(format!(
                        "racer {} is assigned more than once in pool {pool_id}",
                        racer.racer_id
                    )));
                }
            }
        }
        Ok(())
    })?;

    info!("Saved {} participants for pool {}", roster.len(), pool_id);
    Ok(())
}

/// Load the pool's assignments grouped by participant.
pub fn load_pool(db: &Database, pool_id: i64) -> Result<PoolRoster> {
    let rows = db.scope(|store| -> Result<Vec<Assignment>> {
        Ok(store.assignments(pool_id)?)
    })?;
    Ok(group_assignments(rows))
}

/// Group assignment rows by participant. Each participant's racers are
/// sorted by car number.
pub fn group_assignments(rows: Vec<Assignment>) -> PoolRoster {
    let mut roster = PoolRoster::new();
    for row in rows {
        roster.entry(row.participant).or_default().push(AssignedRacer {
            racer_id: row.racer_id,
            racer_name: row.racer_name,
        });
    }
    for racers in roster.values_mut() {
        racers.sort_by(|a, b| compare_racer_ids(&a.racer_id, &b.racer_id));
    }
    roster
}

/// Numeric ids compare by value, ahead of any non-numeric id.
pub fn compare_racer_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn racer(id: &str) -> AssignedRacer {
        AssignedRacer {
            racer_id: id.to_string(),
            racer_name: format!("Driver {id}"),
        }
    }

    #[test]
    fn create_and_list_pools() {
        let db = test_db();
        let family = create_pool(&db, "  Family  ", 6).unwrap();
        let office = create_pool(&db, "Office", 10).unwrap();

        assert_eq!(family.name, "Family");
        let pools = list_pools(&db).unwrap();
        assert_eq!(pools, vec![family, office]);
    }

    #[test]
    fn create_pool_rejects_blank_name() {
        let db = test_db();
        assert!(matches!(create_pool(&db, "   ", 4), Err(Error::InvalidPool(_))));
        assert!(list_pools(&db).unwrap().is_empty());
    }

    #[test]
    fn save_pool_replaces_previous_assignments() {
        let db = test_db();
        let mut first = PoolRoster::new();
        first.insert("Alice".into(), vec![racer("7"), racer("12")]);
        save_pool(&db, 1, &first).unwrap();

        let mut second = PoolRoster::new();
        second.insert("Bob".into(), vec![racer("3")]);
        save_pool(&db, 1, &second).unwrap();

        assert_eq!(load_pool(&db, 1).unwrap(), second);
    }

    #[test]
    fn save_pool_with_duplicate_racer_changes_nothing() {
        let db = test_db();
        let mut original = PoolRoster::new();
        original.insert("Alice".into(), vec![racer("7")]);
        save_pool(&db, 1, &original).unwrap();

        let mut bad = PoolRoster::new();
        bad.insert("Alice".into(), vec![racer("3")]);
        bad.insert("Bob".into(), vec![racer("3")]);
        assert!(matches!(save_pool(&db, 1, &bad), Err(Error::InvalidPool(_))));

        assert_eq!(load_pool(&db, 1).unwrap(), original);
    }

    #[test]
    fn load_pool_sorts_racers_by_car_number() {
        let rows = ["21", "3", "06", "X1"]
            .iter()
            .map(|id| Assignment {
                participant: "Alice".into(),
                racer_id: id.to_string(),
                racer_name: String::new(),
            })
            .collect();
        let roster = group_assignments(rows);
        let ids: Vec<&str> = roster["Alice"]
            .iter()
            .map(|r| r.racer_id.as_str())
            .collect();
        assert_eq!(ids, vec!["3", "06", "21", "X1"]);
    }
}
