// Snake draft: turn order, pick validation, and on-deck projection.

pub mod engine;
pub mod order;
pub mod snake;
pub mod status;
