//! Parameter set selection
//!
//! [`ExposureProfileStore::select`] is a pure function of the measured area.
//! The job-level forcing rules (first slow layers, forced height after a
//! large layer) live in [`SlowLayerPolicy`], which keeps its own state.

use super::params::{AreaFillParameters, ExposureProfile, FillClass};

/// Holds the exposure profile of the running job
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExposureProfileStore {
    profile: ExposureProfile,
}

impl ExposureProfileStore {
    /// Create a store for a job
    pub fn new(profile: ExposureProfile) -> Self {
        Self { profile }
    }

    /// The stored exposure profile
    pub fn profile(&self) -> &ExposureProfile {
        &self.profile
    }

    /// Area fill threshold
    pub fn area_fill(&self) -> f32 {
        self.profile.area_fill
    }

    /// Classify a measured area against the threshold
    ///
    /// Strictly greater selects [`FillClass::Above`].
    pub fn classify(&self, area_fill_measured: f32) -> FillClass {
        if area_fill_measured > self.profile.area_fill {
            FillClass::Above
        } else {
            FillClass::Below
        }
    }

    /// Select the parameter set for a measured area
    pub fn select(&self, area_fill_measured: f32) -> &AreaFillParameters {
        self.profile.parameters(self.classify(area_fill_measured))
    }

    /// Parameters of a fill class
    pub fn parameters(&self, class: FillClass) -> &AreaFillParameters {
        self.profile.parameters(class)
    }
}

/// Job-level slow layer forcing
///
/// A large layer keeps the above set active for `force_slow_height_nm` of
/// further printing, and the first `first_slow_layers` layers always use it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlowLayerPolicy {
    /// Remaining forced height (nm)
    remain_nm: u32,
    /// Layers printed with the above set so far
    slow_layers_done: u32,
}

impl SlowLayerPolicy {
    /// Create a policy at job start
    pub const fn new() -> Self {
        Self {
            remain_nm: 0,
            slow_layers_done: 0,
        }
    }

    /// Decide the fill class of a layer
    ///
    /// Call exactly once per layer, in layer order.
    pub fn classify(
        &mut self,
        store: &ExposureProfileStore,
        layer_index: u32,
        area_fill_measured: f32,
        layer_height_nm: u32,
    ) -> FillClass {
        let profile = store.profile();
        let mut class = store.classify(area_fill_measured);

        if class == FillClass::Above {
            self.remain_nm = profile.force_slow_height_nm;
        } else if self.remain_nm > 0 {
            self.remain_nm = self.remain_nm.saturating_sub(layer_height_nm);
            class = FillClass::Above;
            debug!("Above set forced by height, remain {} nm", self.remain_nm);
        }

        if layer_index < profile.first_slow_layers {
            debug!(
                "Above set forced by first layers, {}/{}",
                layer_index + 1,
                profile.first_slow_layers
            );
            class = FillClass::Above;
        }

        if class == FillClass::Above {
            self.slow_layers_done += 1;
        }
        class
    }

    /// Remaining forced height (nm)
    pub fn remain_nm(&self) -> u32 {
        self.remain_nm
    }

    /// Layers printed with the above set so far
    pub fn slow_layers_done(&self) -> u32 {
        self.slow_layers_done
    }
}
