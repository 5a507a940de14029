//! TOML configuration files
//!
//! The printer file holds the mechanics and the moving profile catalog:
//!
//! ```toml
//! version = 1
//!
//! [tilt]
//! horizontal_position = 4928
//!
//! [stall_guard]
//! recovery_profile = "layer400"
//!
//! [[tilt_profile]]
//! name = "layer400"
//! starting_steprate = 100
//! maximum_steprate = 400
//! acceleration = 200
//! deceleration = 200
//! current = 20
//! ```
//!
//! Omitted sections and keys take their defaults. Profiles used only by the
//! firmware (homing, fast moves) are marked `internal = true`.
//!
//! The exposure profile file maps directly onto [`ExposureProfile`], with
//! `[below_area_fill]` and `[above_area_fill]` tables.

use alloc::string::String;
use alloc::vec::Vec;
use serde::Deserialize;

use lamina_core::config::{
    PrinterConfig, StallGuardConfig, StirringConfig, TiltGeometry, TowerGeometry, CONFIG_VERSION,
};
use lamina_core::exposure::ExposureProfile;
use lamina_core::motion::Axis;
use lamina_core::profiles::{MovingProfile, ProfileParams, ProfileRegistry};

use crate::error::ConfigError;
use crate::validate::{validate_exposure_profile, validate_printer_config};

#[derive(Debug, Deserialize)]
struct PrinterDocument {
    version: u8,
    #[serde(default)]
    tilt: TiltGeometry,
    #[serde(default)]
    tower: TowerGeometry,
    #[serde(default)]
    stall_guard: StallGuardConfig,
    #[serde(default)]
    stirring: StirringConfig,
    #[serde(default, rename = "tilt_profile")]
    tilt_profiles: Vec<ProfileEntry>,
    #[serde(default, rename = "tower_profile")]
    tower_profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    name: String,
    #[serde(default)]
    internal: bool,
    starting_steprate: u16,
    maximum_steprate: u16,
    acceleration: u16,
    deceleration: u16,
    current: u8,
    #[serde(default)]
    stallguard_threshold: u8,
    #[serde(default)]
    coolstep_threshold: u16,
}

impl ProfileEntry {
    fn into_profile(self, axis: Axis) -> Result<MovingProfile, ConfigError> {
        let params = ProfileParams {
            starting_steprate: self.starting_steprate,
            maximum_steprate: self.maximum_steprate,
            acceleration: self.acceleration,
            deceleration: self.deceleration,
            current: self.current,
            stallguard_threshold: self.stallguard_threshold,
            coolstep_threshold: self.coolstep_threshold,
        };
        let profile = MovingProfile::new(&self.name, axis, params)?;
        Ok(if self.internal {
            profile.internal()
        } else {
            profile
        })
    }
}

/// Parse and validate the printer configuration
pub fn parse_printer_config(input: &str) -> Result<PrinterConfig, ConfigError> {
    let doc: PrinterDocument = ::toml::from_str(input).map_err(|_| {
        warn!("Printer configuration is not valid TOML");
        ConfigError::Toml
    })?;

    if doc.version != CONFIG_VERSION {
        warn!(
            "Config version mismatch: found {}, expected {}",
            doc.version,
            CONFIG_VERSION
        );
        return Err(ConfigError::VersionMismatch {
            found: doc.version,
            expected: CONFIG_VERSION,
        });
    }

    let mut profiles = ProfileRegistry::new();
    for (axis, entries) in [
        (Axis::Tilt, doc.tilt_profiles),
        (Axis::Tower, doc.tower_profiles),
    ] {
        for entry in entries {
            profiles.insert(entry.into_profile(axis)?)?;
        }
    }

    let config = PrinterConfig {
        version: doc.version,
        tilt: doc.tilt,
        tower: doc.tower,
        stall_guard: doc.stall_guard,
        stirring: doc.stirring,
        profiles,
    };
    validate_printer_config(&config)?;

    info!("Printer configuration loaded");
    debug!(
        "  {} tilt profiles",
        config.profiles.axis_profiles(Axis::Tilt).count()
    );
    debug!(
        "  {} tower profiles",
        config.profiles.axis_profiles(Axis::Tower).count()
    );
    Ok(config)
}

/// Parse an exposure profile and validate it against a printer configuration
pub fn parse_exposure_profile(
    input: &str,
    config: &PrinterConfig,
) -> Result<ExposureProfile, ConfigError> {
    let profile: ExposureProfile = ::toml::from_str(input).map_err(|_| {
        warn!("Exposure profile is not valid TOML");
        ConfigError::Toml
    })?;
    validate_exposure_profile(&profile, config)?;

    info!("Exposure profile loaded, area fill {}%", profile.area_fill);
    Ok(profile)
}
