//! Per-layer separation parameters
//!
//! An exposure profile pairs an area fill threshold with two parameter
//! sets: one for layers whose cured area is above the threshold and one for
//! the rest. Large layers stick harder to the film and get gentler moves.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::profiles::ProfileName;

/// Separation parameters for one fill class
///
/// Profile references are names resolved through the profile registry when
/// the separation plan is built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AreaFillParameters {
    /// Delay between separation and exposure (ms)
    pub delay_before_exposure_ms: u32,
    /// Delay between exposure and separation (ms)
    pub delay_after_exposure_ms: u32,
    /// Tower rise during layer change (nm), 0 = move straight to the layer
    pub tower_hop_height_nm: u32,
    /// Tower profile for all tower moves
    pub tower_profile: ProfileName,
    /// Use the tilt to tear off the layer
    pub use_tilt: bool,
    /// Tilt profile for the first move down
    pub tilt_down_initial_profile: ProfileName,
    /// Steps of the first move down, relative to the level position
    pub tilt_down_offset_steps: u32,
    /// Pause after the first move down (ms)
    pub tilt_down_offset_delay_ms: u32,
    /// Tilt profile for the remaining moves down
    pub tilt_down_finish_profile: ProfileName,
    /// Parts the remaining distance down is split into
    pub tilt_down_cycles: u8,
    /// Pause between parts (ms)
    pub tilt_down_delay_ms: u32,
    /// Tilt profile for the first move up
    pub tilt_up_initial_profile: ProfileName,
    /// Steps below the level position where the first move up ends
    pub tilt_up_offset_steps: u32,
    /// Pause after the first move up (ms)
    pub tilt_up_offset_delay_ms: u32,
    /// Tilt profile for the remaining moves up
    pub tilt_up_finish_profile: ProfileName,
    /// Parts the remaining distance up is split into
    pub tilt_up_cycles: u8,
    /// Pause between parts (ms)
    pub tilt_up_delay_ms: u32,
    /// Measured duration of all moves (ms), diagnostic only
    pub moves_time_ms: u32,
}

/// Which parameter set a layer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FillClass {
    /// Cured area strictly above the threshold
    Above,
    /// Cured area at or below the threshold
    Below,
}

/// Exposure profile of one print job
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExposureProfile {
    /// Area fill threshold (% of the exposure area)
    pub area_fill: f32,
    /// Parameters for layers at or below the threshold
    pub below_area_fill: AreaFillParameters,
    /// Parameters for layers above the threshold
    pub above_area_fill: AreaFillParameters,
    /// Number of initial layers always printed with the above set
    #[cfg_attr(feature = "serde", serde(default))]
    pub first_slow_layers: u32,
    /// Height after a large layer that keeps using the above set (nm)
    #[cfg_attr(feature = "serde", serde(default))]
    pub force_slow_height_nm: u32,
}

impl ExposureProfile {
    /// Create a profile without slow-layer forcing
    pub fn new(
        area_fill: f32,
        below_area_fill: AreaFillParameters,
        above_area_fill: AreaFillParameters,
    ) -> Self {
        Self {
            area_fill,
            below_area_fill,
            above_area_fill,
            first_slow_layers: 0,
            force_slow_height_nm: 0,
        }
    }

    /// Parameters of a fill class
    pub fn parameters(&self, class: FillClass) -> &AreaFillParameters {
        match class {
            FillClass::Above => &self.above_area_fill,
            FillClass::Below => &self.below_area_fill,
        }
    }
}
