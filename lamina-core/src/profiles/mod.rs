//! Moving profiles
//!
//! Named speed/torque classes for the tilt and tower axes.

pub mod registry;

pub use registry::{
    profile_name, MovingProfile, ProfileKind, ProfileName, ProfileParams, ProfileRegistry,
};
