// Error taxonomy shared by the draft and standings engines.

use thiserror::Error;

use crate::draft::status::Phase;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The pool's phase does not allow the requested transition.
    #[error("pool {pool_id} is not ready for this operation (phase {phase})")]
    NotReady { pool_id: i64, phase: Phase },

    /// A submitted draft order was malformed.
    #[error("invalid draft order: {0}")]
    InvalidOrder(String),

    /// No draft order (or no draft status) is stored for the pool.
    #[error("pool {pool_id} has no draft order")]
    EmptyOrder { pool_id: i64 },

    /// The stored pick index does not resolve to a participant.
    #[error("pool {pool_id} has pick index {index} outside 1..={participants}")]
    CorruptState {
        pool_id: i64,
        index: usize,
        participants: usize,
    },

    #[error("unknown pool {0}")]
    UnknownPool(i64),

    /// Every grid seat has already been drafted.
    #[error("draft for pool {pool_id} is already complete")]
    DraftComplete { pool_id: i64 },

    #[error("invalid pool: {0}")]
    InvalidPool(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// The external leaderboard feed could not be read.
    #[error("leaderboard source failed: {0:#}")]
    Source(#[source] anyhow::Error),

    /// Storage failures propagate unchanged; nothing is retried.
    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}
