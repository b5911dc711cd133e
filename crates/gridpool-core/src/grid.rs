// Event grid: the fixed list of draftable racers and their starting positions.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};

/// A draftable racer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSeat {
    /// Car number. Kept as text so numbers like `"06"` survive.
    pub racer_id: String,
    pub racer_name: String,
    pub starting_position: u32,
}

/// A grid seat and, if drafted in the pool, the participant who took it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSeatStatus {
    #[serde(flatten)]
    pub seat: GridSeat,
    pub taken_by: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GridImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error in {path}: {message}")]
    Validation { path: String, message: String },
}

/// Raw CSV row: `racer_id,racer_name,starting_position`. Extra columns are
/// ignored.
#[derive(Debug, Deserialize)]
struct RawGridRow {
    racer_id: String,
    #[serde(default)]
    racer_name: String,
    starting_position: u32,
}

fn load_grid_from_reader<R: Read>(rdr: R) -> std::result::Result<Vec<GridSeat>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut seats = Vec::new();
    for result in reader.deserialize::<RawGridRow>() {
        match result {
            Ok(raw) => {
                let racer_id = raw.racer_id.trim();
                if racer_id.is_empty() {
                    warn!("skipping grid row with blank racer_id");
                    continue;
                }
                seats.push(GridSeat {
                    racer_id: racer_id.to_string(),
                    racer_name: raw.racer_name.trim().to_string(),
                    starting_position: raw.starting_position,
                });
            }
            Err(e) => {
                warn!("skipping malformed grid row: {}", e);
            }
        }
    }
    seats.sort_by_key(|seat| seat.starting_position);
    Ok(seats)
}

/// Load the event grid from a CSV file, sorted by starting position.
pub fn load_grid_csv(path: &Path) -> std::result::Result<Vec<GridSeat>, GridImportError> {
    let file = std::fs::File::open(path).map_err(|e| GridImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let seats = load_grid_from_reader(file).map_err(|e| GridImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    validate_grid(&seats).map_err(|message| GridImportError::Validation {
        path: path.display().to_string(),
        message,
    })?;
    Ok(seats)
}

/// Racer ids and starting positions must each be unique.
pub fn validate_grid(seats: &[GridSeat]) -> std::result::Result<(), String> {
    let mut ids = HashSet::new();
    let mut positions = HashSet::new();
    for seat in seats {
        if !ids.insert(seat.racer_id.as_str()) {
            return Err(format!("racer {} appears more than once", seat.racer_id));
        }
        if !positions.insert(seat.starting_position) {
            return Err(format!(
                "starting position {} is used more than once",
                seat.starting_position
            ));
        }
    }
    Ok(())
}

/// Store the event grid, replacing any previous one.
pub fn replace_grid(db: &Database, seats: &[GridSeat]) -> Result<()> {
    validate_grid(seats).map_err(Error::InvalidGrid)?;
    db.scope(|store| -> Result<()> { Ok(store.replace_grid(seats)?) })?;
    info!("Stored grid with {} seats", seats.len());
    Ok(())
}

/// The stored grid, ordered by starting position.
pub fn grid_seats(db: &Database) -> Result<Vec<GridSeat>> {
    db.scope(|store| -> Result<Vec<GridSeat>> { Ok(store.grid_seats()?) })
}

/// The grid annotated with who took each racer in this pool.
pub fn grid_status(db: &Database, pool_id: i64) -> Result<Vec<GridSeatStatus>> {
    db.scope(|store| -> Result<Vec<GridSeatStatus>> { Ok(store.grid_status(pool_id)?) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_csv_sorted_by_position() {
        let csv_data = "\
racer_id,racer_name,starting_position
10,Alex Palou,2
06,Helio Castroneves,3
60,Felix Rosenqvist,1
";
        let seats = load_grid_from_reader(csv_data.as_bytes()).unwrap();
        let ids: Vec<&str> = seats.iter().map(|s| s.racer_id.as_str()).collect();
        assert_eq!(ids, vec!["60", "10", "06"]);
        assert_eq!(seats[2].racer_name, "Helio Castroneves");
    }

    #[test]
    fn grid_csv_skips_malformed_rows() {
        let csv_data = "\
racer_id,racer_name,starting_position
10,Alex Palou,second
,Nobody,4
5,Pato O'Ward,1
";
        let seats = load_grid_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(seats.len(), 1);
        assert_eq!(seats[0].racer_id, "5");
    }

    #[test]
    fn grid_csv_extra_columns_ignored() {
        let csv_data = "\
racer_id,racer_name,team,starting_position
2,Josef Newgarden,Penske,1
";
        let seats = load_grid_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(seats[0].starting_position, 1);
    }

    #[test]
    fn validate_grid_rejects_duplicates() {
        let seat = |id: &str, pos: u32| GridSeat {
            racer_id: id.into(),
            racer_name: String::new(),
            starting_position: pos,
        };
        assert!(validate_grid(&[seat("1", 1), seat("2", 2)]).is_ok());
        assert!(validate_grid(&[seat("1", 1), seat("1", 2)]).is_err());
        assert!(validate_grid(&[seat("1", 1), seat("2", 1)]).is_err());
    }

    #[test]
    fn load_grid_csv_reports_missing_file() {
        let err =
            load_grid_csv(Path::new("/nonexistent/grid.csv")).unwrap_err();
        assert!(matches!(err, GridImportError::Io { .. }));
    }

    #[test]
    fn replace_grid_rejects_duplicate_ids() {
        let db = Database::open(":memory:").unwrap();
        let seats = vec![
            GridSeat {
                racer_id: "1".into(),
                racer_name: "A".into(),
                starting_position: 1,
            },
            GridSeat {
                racer_id: "1".into(),
                racer_name: "B".into(),
                starting_position: 2,
            },
        ];
        assert!(matches!(replace_grid(&db, &seats), Err(Error::InvalidGrid(_))));
        assert!(grid_seats(&db).unwrap().is_empty());
    }
}
