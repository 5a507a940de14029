//! Moving profile catalog
//!
//! A moving profile is a named speed/torque class for one axis. Profiles are
//! defined once by the configuration loader and then only looked up, never
//! modified.

use heapless::{String, Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{ConfigurationError, MAX_LABEL_LEN, MAX_PROFILES};
use crate::motion::Axis;

/// Profile name as referenced from configuration
pub type ProfileName = String<MAX_LABEL_LEN>;

/// Build a profile name from a string slice
pub fn profile_name(name: &str) -> Result<ProfileName, ConfigurationError> {
    let mut label = ProfileName::new();
    label
        .push_str(name)
        .map_err(|_| ConfigurationError::LabelTooLong)?;
    Ok(label)
}

/// Who may use a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProfileKind {
    /// May be referenced from exposure profiles
    #[default]
    UserSelectable,
    /// Homing, fast moves, resin sensing; firmware use only
    FirmwareInternal,
}

/// Hardware parameters of a moving profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileParams {
    /// Step rate the ramp starts from (steps/s)
    pub starting_steprate: u16,
    /// Cruise step rate (steps/s)
    pub maximum_steprate: u16,
    /// Acceleration (steps/s²)
    pub acceleration: u16,
    /// Deceleration (steps/s²)
    pub deceleration: u16,
    /// Run current scale (0-31)
    pub current: u8,
    /// Driver StallGuard threshold (0-255, higher = more sensitive)
    pub stallguard_threshold: u8,
    /// Lower velocity bound for CoolStep/StallGuard
    pub coolstep_threshold: u16,
}

/// A named moving profile
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MovingProfile {
    /// Profile name (unique per axis)
    pub name: ProfileName,
    /// Axis this profile drives
    pub axis: Axis,
    /// Capability flag
    pub kind: ProfileKind,
    /// Ramp and driver parameters
    pub params: ProfileParams,
}

impl MovingProfile {
    /// Create a user-selectable profile
    pub fn new(name: &str, axis: Axis, params: ProfileParams) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: profile_name(name)?,
            axis,
            kind: ProfileKind::UserSelectable,
            params,
        })
    }

    /// Mark the profile as firmware-internal
    pub fn internal(mut self) -> Self {
        self.kind = ProfileKind::FirmwareInternal;
        self
    }

    /// Nominal cruise speed (steps/s)
    pub fn nominal_speed(&self) -> u16 {
        self.params.maximum_steprate
    }

    /// Torque class (run current scale)
    pub fn torque_class(&self) -> u8 {
        self.params.current
    }

    /// Check if exposure profiles may reference this profile
    pub fn is_user_selectable(&self) -> bool {
        self.kind == ProfileKind::UserSelectable
    }
}

/// Registry of moving profiles for both axes
///
/// Passive storage: policy on which profiles an exposure profile may use
/// belongs to the configuration loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileRegistry {
    profiles: Vec<MovingProfile, MAX_PROFILES>,
}

impl ProfileRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Register a profile
    pub fn insert(&mut self, profile: MovingProfile) -> Result<(), ConfigurationError> {
        if self.find(profile.axis, &profile.name).is_some() {
            return Err(ConfigurationError::DuplicateProfile);
        }
        self.profiles
            .push(profile)
            .map_err(|_| ConfigurationError::TooManyProfiles)
    }

    /// Resolve a profile name for an axis
    pub fn resolve(&self, axis: Axis, name: &str) -> Result<&MovingProfile, ConfigurationError> {
        self.find(axis, name)
            .ok_or(ConfigurationError::UnknownProfile(axis))
    }

    /// Find a profile by axis and name
    pub fn find(&self, axis: Axis, name: &str) -> Option<&MovingProfile> {
        self.profiles
            .iter()
            .find(|p| p.axis == axis && p.name.as_str() == name)
    }

    /// Check whether a name exists on any axis
    pub fn contains_name(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p.name.as_str() == name)
    }

    /// Profiles of one axis, in registration order
    pub fn axis_profiles(&self, axis: Axis) -> impl Iterator<Item = &MovingProfile> {
        self.profiles.iter().filter(move |p| p.axis == axis)
    }

    /// All profiles
    pub fn iter(&self) -> impl Iterator<Item = &MovingProfile> {
        self.profiles.iter()
    }

    /// Number of registered profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if no profile is registered
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
