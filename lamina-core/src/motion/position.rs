//! Axis and position types shared by the sequencer and motion controllers
//!
//! Tilt positions are expressed in microsteps, tower positions in
//! nanometres of platform travel.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Actuator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// Vat tilt (peels the layer off the film)
    Tilt,
    /// Build platform tower (print axis)
    Tower,
}

impl Axis {
    /// Lower-case axis name, as used in configuration files
    pub const fn name(self) -> &'static str {
        match self {
            Axis::Tilt => "tilt",
            Axis::Tower => "tower",
        }
    }
}

/// Terminal state of a commanded move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveResult {
    /// Axis reached the commanded position
    Reached,
    /// Axis stopped early (driver stall or endstop)
    Stopped,
    /// Watchdog window expired before the axis reached the target
    TimedOut,
}

impl MoveResult {
    /// Check if the commanded position was reached
    pub fn is_reached(self) -> bool {
        self == MoveResult::Reached
    }
}

/// Where the tower has to be for the next layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerTarget {
    /// Absolute tower position of the next layer (nm)
    pub position_nm: i32,
    /// This was the last layer of the job
    pub last_layer: bool,
}

impl LayerTarget {
    /// Target for a regular layer
    pub const fn next(position_nm: i32) -> Self {
        Self {
            position_nm,
            last_layer: false,
        }
    }

    /// Target after the last layer
    pub const fn last(position_nm: i32) -> Self {
        Self {
            position_nm,
            last_layer: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_names() {
        assert_eq!(Axis::Tilt.name(), "tilt");
        assert_eq!(Axis::Tower.name(), "tower");
    }

    #[test]
    fn test_layer_target() {
        let target = LayerTarget::next(50_000);
        assert_eq!(target.position_nm, 50_000);
        assert!(!target.last_layer);
        assert!(LayerTarget::last(0).last_layer);
    }

    #[test]
    fn test_move_result() {
        assert!(MoveResult::Reached.is_reached());
        assert!(!MoveResult::Stopped.is_reached());
        assert!(!MoveResult::TimedOut.is_reached());
    }
}
