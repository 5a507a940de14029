//! Loader-side validation policy
//!
//! The core registry only stores profiles. Which of them an exposure
//! profile may reference, and the ranges of its numeric settings, are
//! decided here before a job can start.

use lamina_core::config::{
    ConfigurationError, PrinterConfig, MAX_STIRRING_MOVES, MAX_TILT_CYCLES,
};
use lamina_core::exposure::{AreaFillParameters, ExposureProfile};
use lamina_core::motion::Axis;
use lamina_core::profiles::MovingProfile;

/// Largest tilt offset (microsteps)
pub const MAX_OFFSET_STEPS: u32 = 10_000;

/// Largest configurable delay (ms)
pub const MAX_DELAY_MS: u32 = 30_000;

/// Largest driver current scale
const MAX_CURRENT: u8 = 31;

fn ensure(condition: bool) -> Result<(), ConfigurationError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigurationError::ValueOutOfRange)
    }
}

/// Look up a profile, telling a wrong axis apart from an unknown name
fn profile_on_axis<'a>(
    config: &'a PrinterConfig,
    axis: Axis,
    name: &str,
) -> Result<&'a MovingProfile, ConfigurationError> {
    config.profiles.resolve(axis, name).map_err(|err| {
        if config.profiles.contains_name(name) {
            ConfigurationError::WrongAxis(axis)
        } else {
            err
        }
    })
}

fn user_profile(config: &PrinterConfig, axis: Axis, name: &str) -> Result<(), ConfigurationError> {
    if profile_on_axis(config, axis, name)?.is_user_selectable() {
        Ok(())
    } else {
        Err(ConfigurationError::InternalProfile(axis))
    }
}

fn check_cycles(cycles: u8) -> Result<(), ConfigurationError> {
    if (1..=MAX_TILT_CYCLES).contains(&cycles) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidCycleCount)
    }
}

/// Validate the printer configuration
pub fn validate_printer_config(config: &PrinterConfig) -> Result<(), ConfigurationError> {
    let tilt = &config.tilt;
    ensure(tilt.endstop_position < tilt.horizontal_position)?;
    ensure(tilt.horizontal_position <= tilt.max_position)?;
    ensure(tilt.homing_tolerance >= 0)?;
    ensure(config.tower.nm_per_step > 0)?;

    for profile in config.profiles.iter() {
        let params = &profile.params;
        ensure(params.maximum_steprate > 0)?;
        ensure(params.starting_steprate <= params.maximum_steprate)?;
        ensure(params.current <= MAX_CURRENT)?;
    }

    let stall_guard = &config.stall_guard;
    profile_on_axis(config, Axis::Tilt, &stall_guard.recovery_profile)?;
    ensure(stall_guard.step_steps > 0)?;
    ensure(stall_guard.max_attempts > 0)?;

    ensure(config.stirring.moves <= MAX_STIRRING_MOVES)?;
    ensure(config.stirring.delay_ms <= MAX_DELAY_MS)
}

/// Validate one parameter set against the profile catalog
///
/// Tilt settings are only checked when the set uses the tilt.
pub fn validate_parameters(
    params: &AreaFillParameters,
    config: &PrinterConfig,
) -> Result<(), ConfigurationError> {
    user_profile(config, Axis::Tower, &params.tower_profile)?;
    ensure(params.delay_before_exposure_ms <= MAX_DELAY_MS)?;
    ensure(params.delay_after_exposure_ms <= MAX_DELAY_MS)?;
    ensure(params.tower_hop_height_nm <= i32::MAX as u32)?;
    // A hop shorter than one microstep would not move the tower
    let hop = params.tower_hop_height_nm;
    ensure(hop == 0 || hop >= config.tower.nm_per_step)?;

    if !params.use_tilt {
        return Ok(());
    }

    for name in [
        &params.tilt_down_initial_profile,
        &params.tilt_down_finish_profile,
        &params.tilt_up_initial_profile,
        &params.tilt_up_finish_profile,
    ] {
        user_profile(config, Axis::Tilt, name)?;
    }

    check_cycles(params.tilt_down_cycles)?;
    check_cycles(params.tilt_up_cycles)?;

    ensure(params.tilt_down_offset_steps <= MAX_OFFSET_STEPS)?;
    ensure(params.tilt_up_offset_steps <= MAX_OFFSET_STEPS)?;

    for delay in [
        params.tilt_down_offset_delay_ms,
        params.tilt_down_delay_ms,
        params.tilt_up_offset_delay_ms,
        params.tilt_up_delay_ms,
    ] {
        ensure(delay <= MAX_DELAY_MS)?;
    }
    Ok(())
}

/// Validate an exposure profile against the printer configuration
pub fn validate_exposure_profile(
    profile: &ExposureProfile,
    config: &PrinterConfig,
) -> Result<(), ConfigurationError> {
    ensure((0.0..=100.0).contains(&profile.area_fill))?;
    validate_parameters(&profile.below_area_fill, config)?;
    validate_parameters(&profile.above_area_fill, config)
}
