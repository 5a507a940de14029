//! Exposure profiles
//!
//! Per-job separation parameters and their per-layer selection.

pub mod params;
pub mod store;

pub use params::{AreaFillParameters, ExposureProfile, FillClass};
pub use store::{ExposureProfileStore, SlowLayerPolicy};
