// Library root: race-pool snake drafts and live standings.

pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod grid;
pub mod leaderboard;
pub mod pool;
pub mod standings;

pub use error::{Error, Result};
