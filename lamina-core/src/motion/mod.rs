//! Axis positions and move planning

pub mod planner;
pub mod position;

pub use planner::{estimate_move_ms, split_travel, watchdog_ms, WATCHDOG_MARGIN_MS};
pub use position::{Axis, LayerTarget, MoveResult};
