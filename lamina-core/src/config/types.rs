//! Configuration type definitions
//!
//! These types describe the printer mechanics and the separation settings.
//! The whole [`PrinterConfig`] is loaded once at job start and passed by
//! reference into the sequencer; it is never mutated while printing.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::motion::Axis;
use crate::profiles::{ProfileName, ProfileRegistry};

/// Maximum label length (profile names)
pub const MAX_LABEL_LEN: usize = 16;

/// Maximum moving profiles in the registry (both axes)
pub const MAX_PROFILES: usize = 40;

/// Maximum split count for tilt strokes
pub const MAX_TILT_CYCLES: u8 = 10;

/// Maximum stirring moves before a print
pub const MAX_STIRRING_MOVES: u8 = 10;

/// Current configuration format version
pub const CONFIG_VERSION: u8 = 1;

/// Configuration errors
///
/// Raised by the registry and the configuration loader. All of them are
/// fatal: a job cannot start with an invalid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    /// Profile name not present in the registry for that axis
    UnknownProfile(Axis),
    /// Profile referenced for the wrong axis
    WrongAxis(Axis),
    /// Firmware-internal profile referenced from an exposure profile
    InternalProfile(Axis),
    /// Tilt cycle count outside 1..=MAX_TILT_CYCLES
    InvalidCycleCount,
    /// Numeric value outside its allowed range
    ValueOutOfRange,
    /// Profile with the same axis and name already registered
    DuplicateProfile,
    /// Registry capacity exceeded
    TooManyProfiles,
    /// Label longer than MAX_LABEL_LEN
    LabelTooLong,
}

/// Tilt axis geometry (microsteps)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TiltGeometry {
    /// Calibrated position where the vat is level
    pub horizontal_position: i32,
    /// Position at the bottom endstop
    pub endstop_position: i32,
    /// Top mechanical limit
    pub max_position: i32,
    /// Allowed distance from the endstop position when checking it
    pub homing_tolerance: i32,
}

impl Default for TiltGeometry {
    fn default() -> Self {
        Self {
            horizontal_position: 4928,
            endstop_position: 0,
            max_position: 6016,
            homing_tolerance: 96,
        }
    }
}

impl TiltGeometry {
    /// Full travel between the endstop and the top limit
    pub fn travel(&self) -> u32 {
        self.max_position.abs_diff(self.endstop_position)
    }

    /// Check if a position is within tolerance of the endstop position
    pub fn at_endstop(&self, position: i32) -> bool {
        position.abs_diff(self.endstop_position) <= self.homing_tolerance.unsigned_abs()
    }
}

/// Tower axis geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TowerGeometry {
    /// Platform travel per microstep (nm)
    pub nm_per_step: u32,
}

impl Default for TowerGeometry {
    fn default() -> Self {
        // 4 mm lead screw, 200 full steps, 16 microsteps
        Self { nm_per_step: 1250 }
    }
}

impl TowerGeometry {
    /// Convert a tower distance in nm to microsteps (nearest step)
    pub fn nm_to_steps(&self, nm: i32) -> i32 {
        if self.nm_per_step == 0 {
            return 0;
        }
        let per_step = self.nm_per_step as i64;
        let half = per_step / 2;
        let nm = nm as i64;
        let steps = if nm >= 0 {
            (nm + half) / per_step
        } else {
            (nm - half) / per_step
        };
        steps as i32
    }

    /// Convert microsteps to nm
    pub fn steps_to_nm(&self, steps: i32) -> i32 {
        (steps as i64 * self.nm_per_step as i64).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

/// Stall recovery settings for the tilt axis
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StallGuardConfig {
    /// Tilt profile used while unsticking
    pub recovery_profile: ProfileName,
    /// Nudge size per recovery attempt (microsteps)
    pub step_steps: u16,
    /// Attempts per recovery run
    pub max_attempts: u8,
    /// Recovery runs allowed per layer
    pub max_recoveries_per_layer: u8,
}

impl Default for StallGuardConfig {
    fn default() -> Self {
        let mut recovery_profile = ProfileName::new();
        let _ = recovery_profile.push_str("layer400");
        Self {
            recovery_profile,
            step_steps: 128,
            max_attempts: 47,
            max_recoveries_per_layer: 1,
        }
    }
}

/// Resin stirring settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StirringConfig {
    /// Tilt down/up pairs per stirring run
    pub moves: u8,
    /// Pause after stirring before the first exposure (ms)
    pub delay_ms: u32,
}

impl Default for StirringConfig {
    fn default() -> Self {
        Self {
            moves: 3,
            delay_ms: 500,
        }
    }
}

/// Complete printer configuration
///
/// Top-level snapshot handed to the sequencer at job start.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrinterConfig {
    /// Configuration version for compatibility checks
    pub version: u8,
    /// Tilt geometry
    pub tilt: TiltGeometry,
    /// Tower geometry
    pub tower: TowerGeometry,
    /// Tilt stall recovery
    pub stall_guard: StallGuardConfig,
    /// Resin stirring
    pub stirring: StirringConfig,
    /// Moving profiles available on this hardware
    pub profiles: ProfileRegistry,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            tilt: TiltGeometry::default(),
            tower: TowerGeometry::default(),
            stall_guard: StallGuardConfig::default(),
            stirring: StirringConfig::default(),
            profiles: ProfileRegistry::new(),
        }
    }
}

impl PrinterConfig {
    /// Create a configuration with default geometry and no profiles
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilt_endstop_tolerance() {
        let tilt = TiltGeometry::default();
        assert!(tilt.at_endstop(0));
        assert!(tilt.at_endstop(96));
        assert!(tilt.at_endstop(-96));
        assert!(!tilt.at_endstop(97));
        assert_eq!(tilt.travel(), 6016);
    }

    #[test]
    fn test_tower_conversion() {
        let tower = TowerGeometry::default();
        assert_eq!(tower.nm_to_steps(50_000), 40);
        assert_eq!(tower.steps_to_nm(40), 50_000);
        assert_eq!(tower.nm_to_steps(-2500), -2);

        // Sub-step distances round to the nearest step
        assert_eq!(tower.nm_to_steps(600), 0);
        assert_eq!(tower.nm_to_steps(700), 1);
        assert_eq!(tower.nm_to_steps(-700), -1);
        assert_eq!(tower.nm_to_steps(1874), 1);
        assert_eq!(tower.nm_to_steps(1875), 2);

        let broken = TowerGeometry { nm_per_step: 0 };
        assert_eq!(broken.nm_to_steps(1000), 0);
    }

    #[test]
    fn test_default_config() {
        let config = PrinterConfig::new();
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.profiles.is_empty());
        assert_eq!(config.stall_guard.recovery_profile.as_str(), "layer400");
        assert_eq!(config.stall_guard.max_recoveries_per_layer, 1);
    }
}
