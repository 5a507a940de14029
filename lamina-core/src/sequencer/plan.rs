//! Separation plan
//!
//! The branching on `use_tilt`, the hop height and the last layer happens
//! once, here, producing a flat list of typed phase descriptors with every
//! profile already resolved. The executor only interprets the list.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::SeparationError;
use crate::config::{PrinterConfig, MAX_STIRRING_MOVES, MAX_TILT_CYCLES};
use crate::exposure::AreaFillParameters;
use crate::motion::{estimate_move_ms, split_travel, Axis, LayerTarget};
use crate::profiles::MovingProfile;

/// Maximum phases in one plan (stirring runs two per move)
pub const MAX_PHASES: usize = 2 * MAX_STIRRING_MOVES as usize;

/// Layer separation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// Tilt peels the layer off the film, down to the endstop
    TiltDown,
    /// Tower rises by the hop height
    TowerHop,
    /// Tower moves straight to the next layer
    TowerToLayer,
    /// Tilt returns to the level position
    TiltUp,
    /// Tower comes down from the hop to the next layer
    TowerLower,
}

impl Phase {
    /// Phase name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Phase::TiltDown => "tilt_down",
            Phase::TowerHop => "tower_hop",
            Phase::TowerToLayer => "tower_to_layer",
            Phase::TiltUp => "tilt_up",
            Phase::TowerLower => "tower_lower",
        }
    }

    /// Axis the phase drives
    pub const fn axis(self) -> Axis {
        match self {
            Phase::TiltDown | Phase::TiltUp => Axis::Tilt,
            Phase::TowerHop | Phase::TowerToLayer | Phase::TowerLower => Axis::Tower,
        }
    }
}

/// One tilt stroke: an offset move, a pause, then a split finish move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltStroke<'r> {
    /// Profile of the offset move
    pub initial: &'r MovingProfile,
    /// Profile of the finish sub-moves
    pub finish: &'r MovingProfile,
    /// Where the stroke is expected to start (steps)
    pub start: i32,
    /// Target of the offset move (steps)
    pub offset_target: i32,
    /// Pause after the offset move (ms)
    pub offset_delay_ms: u32,
    /// Final target of the stroke (steps)
    pub end_target: i32,
    /// Number of finish sub-moves
    pub cycles: u8,
    /// Pause between consecutive sub-moves (ms)
    pub cycle_delay_ms: u32,
}

impl TiltStroke<'_> {
    /// Sub-move targets of the finish move
    pub fn sub_moves(&self) -> impl Iterator<Item = i32> {
        split_travel(self.offset_target, self.end_target, self.cycles)
    }

    /// Estimated duration including pauses (ms)
    pub fn estimate_ms(&self) -> u32 {
        let offset = estimate_move_ms(
            &self.initial.params,
            self.start.abs_diff(self.offset_target),
        );
        let mut total = offset.saturating_add(self.offset_delay_ms);
        let mut from = self.offset_target;
        for target in self.sub_moves() {
            total = total.saturating_add(estimate_move_ms(
                &self.finish.params,
                from.abs_diff(target),
            ));
            from = target;
        }
        let pauses = self.cycles.max(1) as u32 - 1;
        total.saturating_add(pauses.saturating_mul(self.cycle_delay_ms))
    }
}

/// Tower motion of a phase (nm)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TowerMove {
    /// Relative rise from the current position
    Relative(i32),
    /// Absolute position
    Absolute(i32),
}

/// Work of a single phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseStep<'r> {
    /// Tilt stroke
    Tilt(TiltStroke<'r>),
    /// Single tower move
    Tower {
        profile: &'r MovingProfile,
        motion: TowerMove,
    },
}

/// A planned phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseDescriptor<'r> {
    /// Which phase this is
    pub phase: Phase,
    /// What the phase does
    pub step: PhaseStep<'r>,
}

impl PhaseDescriptor<'_> {
    /// Estimated duration (ms)
    ///
    /// `tower_from_nm` is the last known tower position, used for
    /// absolute tower moves; without it they estimate as 0.
    pub fn estimate_ms(&self, config: &PrinterConfig, tower_from_nm: Option<i32>) -> u32 {
        match self.step {
            PhaseStep::Tilt(stroke) => stroke.estimate_ms(),
            PhaseStep::Tower { profile, motion } => {
                let distance_nm = match (motion, tower_from_nm) {
                    (TowerMove::Relative(delta), _) => delta.unsigned_abs(),
                    (TowerMove::Absolute(target), Some(from)) => target.abs_diff(from),
                    (TowerMove::Absolute(_), None) => 0,
                };
                let steps = config.tower.nm_to_steps(distance_nm.min(i32::MAX as u32) as i32);
                estimate_move_ms(&profile.params, steps.unsigned_abs())
            }
        }
    }
}

/// Ordered list of phases for one separation or stirring run
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationPlan<'r> {
    phases: Vec<PhaseDescriptor<'r>, MAX_PHASES>,
    recovery: Option<&'r MovingProfile>,
}

/// Map registry failures to separation errors
fn resolve<'r>(
    config: &'r PrinterConfig,
    axis: Axis,
    name: &str,
) -> Result<&'r MovingProfile, SeparationError> {
    config
        .profiles
        .resolve(axis, name)
        .map_err(|_| SeparationError::ProfileNotFound(axis))
}

fn check_cycles(cycles: u8) -> Result<u8, SeparationError> {
    if cycles == 0 || cycles > MAX_TILT_CYCLES {
        return Err(SeparationError::InvalidCycleCount);
    }
    Ok(cycles)
}

/// Resolved tilt strokes of a parameter set
struct Strokes<'r> {
    down: TiltStroke<'r>,
    up: TiltStroke<'r>,
    recovery: &'r MovingProfile,
}

impl<'r> Strokes<'r> {
    fn build(params: &AreaFillParameters, config: &'r PrinterConfig) -> Result<Self, SeparationError> {
        let tilt = &config.tilt;
        let horizontal = tilt.horizontal_position;
        let offset = |steps: u32| {
            (horizontal as i64 - steps as i64).max(tilt.endstop_position as i64) as i32
        };

        let down = TiltStroke {
            initial: resolve(config, Axis::Tilt, &params.tilt_down_initial_profile)?,
            finish: resolve(config, Axis::Tilt, &params.tilt_down_finish_profile)?,
            start: horizontal,
            offset_target: offset(params.tilt_down_offset_steps),
            offset_delay_ms: params.tilt_down_offset_delay_ms,
            end_target: tilt.endstop_position,
            cycles: check_cycles(params.tilt_down_cycles)?,
            cycle_delay_ms: params.tilt_down_delay_ms,
        };
        let up = TiltStroke {
            initial: resolve(config, Axis::Tilt, &params.tilt_up_initial_profile)?,
            finish: resolve(config, Axis::Tilt, &params.tilt_up_finish_profile)?,
            start: tilt.endstop_position,
            offset_target: offset(params.tilt_up_offset_steps),
            offset_delay_ms: params.tilt_up_offset_delay_ms,
            end_target: horizontal,
            cycles: check_cycles(params.tilt_up_cycles)?,
            cycle_delay_ms: params.tilt_up_delay_ms,
        };
        let recovery = resolve(config, Axis::Tilt, &config.stall_guard.recovery_profile)?;

        Ok(Self { down, up, recovery })
    }
}

impl<'r> SeparationPlan<'r> {
    /// Plan the separation after one layer
    ///
    /// Fails before any motion if a profile is unknown or a cycle count is
    /// out of range.
    pub fn for_layer(
        params: &AreaFillParameters,
        config: &'r PrinterConfig,
        target: LayerTarget,
    ) -> Result<Self, SeparationError> {
        let mut plan = Self {
            phases: Vec::new(),
            recovery: None,
        };

        let strokes = if params.use_tilt {
            Some(Strokes::build(params, config)?)
        } else {
            None
        };
        let tower = resolve(config, Axis::Tower, &params.tower_profile)?;
        let hop = params.tower_hop_height_nm.min(i32::MAX as u32) as i32;

        if let Some(strokes) = &strokes {
            plan.recovery = Some(strokes.recovery);
            plan.push(Phase::TiltDown, PhaseStep::Tilt(strokes.down))?;
        }
        if hop > 0 {
            plan.push(
                Phase::TowerHop,
                PhaseStep::Tower {
                    profile: tower,
                    motion: TowerMove::Relative(hop),
                },
            )?;
        } else if !target.last_layer || !params.use_tilt {
            // Without the tilt the tower move itself releases the part
            plan.push(
                Phase::TowerToLayer,
                PhaseStep::Tower {
                    profile: tower,
                    motion: TowerMove::Absolute(target.position_nm),
                },
            )?;
        }
        if target.last_layer {
            // Only release the part
            return Ok(plan);
        }
        if let Some(strokes) = &strokes {
            plan.push(Phase::TiltUp, PhaseStep::Tilt(strokes.up))?;
        }
        if hop > 0 {
            plan.push(
                Phase::TowerLower,
                PhaseStep::Tower {
                    profile: tower,
                    motion: TowerMove::Absolute(target.position_nm),
                },
            )?;
        }

        Ok(plan)
    }

    /// Plan a stirring run of `moves` tilt down/up pairs
    ///
    /// Empty when the parameter set does not use the tilt.
    pub fn for_stirring(
        params: &AreaFillParameters,
        config: &'r PrinterConfig,
        moves: u8,
    ) -> Result<Self, SeparationError> {
        let mut plan = Self {
            phases: Vec::new(),
            recovery: None,
        };
        if !params.use_tilt {
            return Ok(plan);
        }
        if moves > MAX_STIRRING_MOVES {
            return Err(SeparationError::InvalidCycleCount);
        }

        let strokes = Strokes::build(params, config)?;
        plan.recovery = Some(strokes.recovery);
        for _ in 0..moves {
            plan.push(Phase::TiltDown, PhaseStep::Tilt(strokes.down))?;
            plan.push(Phase::TiltUp, PhaseStep::Tilt(strokes.up))?;
        }
        Ok(plan)
    }

    fn push(&mut self, phase: Phase, step: PhaseStep<'r>) -> Result<(), SeparationError> {
        self.phases
            .push(PhaseDescriptor { phase, step })
            .map_err(|_| SeparationError::InvalidCycleCount)
    }

    /// Planned phases in execution order
    pub fn phases(&self) -> &[PhaseDescriptor<'r>] {
        &self.phases
    }

    /// Phase names in execution order
    pub fn phase_list(&self) -> Vec<Phase, MAX_PHASES> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    /// Tilt profile used for stall recovery, if the plan uses the tilt
    pub fn recovery_profile(&self) -> Option<&'r MovingProfile> {
        self.recovery
    }

    /// Check if the plan has no phases
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Check if any phase drives the given axis
    pub fn uses_axis(&self, axis: Axis) -> bool {
        self.phases.iter().any(|p| p.phase.axis() == axis)
    }
}
