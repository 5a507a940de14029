//! Tilt endstop check and unstuck recovery
//!
//! After the tilt goes down the vat must rest on its endstop. If it does
//! not, the layer is probably still glued to the film: the tilt is nudged
//! towards the endstop in small steps with the recovery profile. Recovery
//! is bounded both per run (attempts, travel) and per layer (runs).
//!
//! A move that hits its watchdog is not a stall: it surfaces as
//! [`SeparationError::MotionTimeout`] of the tilt-down phase, fatal once a
//! recovery run has started.

use crate::config::{StallGuardConfig, TiltGeometry};
use crate::motion::{Axis, MoveResult};
use crate::profiles::MovingProfile;
use crate::sequencer::{Phase, SeparationError};
use crate::traits::{ActuatorFault, MotionController};

fn tilt_timeout(recovery_ran: bool) -> SeparationError {
    SeparationError::MotionTimeout {
        phase: Phase::TiltDown,
        axis: Axis::Tilt,
        recovery_ran,
    }
}

/// Endstop condition after the tilt went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndstopState {
    /// Endstop active and position within tolerance
    Reached,
    /// Endstop inactive or position off
    NotReached,
}

/// Result of one recovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryOutcome {
    /// Endstop reached; position counter re-synchronised
    Recovered { attempts: u16 },
    /// Attempts or travel exhausted
    Unrecovered { attempts: u16 },
}

impl RecoveryOutcome {
    /// Nudges issued
    pub fn attempts(self) -> u16 {
        match self {
            RecoveryOutcome::Recovered { attempts } | RecoveryOutcome::Unrecovered { attempts } => {
                attempts
            }
        }
    }

    /// Convert into the separation error contract
    pub fn into_result(self) -> Result<u16, SeparationError> {
        match self {
            RecoveryOutcome::Recovered { attempts } => Ok(attempts),
            RecoveryOutcome::Unrecovered { .. } => Err(SeparationError::StallUnrecovered),
        }
    }
}

/// Recovery runs left in the current layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecoveryBudget {
    used: u8,
    limit: u8,
}

impl RecoveryBudget {
    /// Create a budget of `limit` runs
    pub const fn new(limit: u8) -> Self {
        Self { used: 0, limit }
    }

    /// Take one run from the budget
    pub fn try_take(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    /// Runs used so far
    pub fn used(&self) -> u8 {
        self.used
    }

    /// Runs left
    pub fn remaining(&self) -> u8 {
        self.limit - self.used
    }
}

/// What happened at the endstop after a tilt-down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StallReport {
    /// Endstop was not reached after the tilt-down
    pub detected: bool,
    /// Recovery reached the endstop
    pub recovered: bool,
    /// Recovery runs started
    pub runs: u8,
    /// Nudges issued over all runs
    pub attempts: u16,
}

impl StallReport {
    /// Check if the tilt ended on its endstop
    pub fn at_endstop(&self) -> bool {
        !self.detected || self.recovered
    }
}

/// Endstop supervision for the tilt axis
#[derive(Debug, Clone, Copy)]
pub struct StallGuard<'c> {
    tilt: &'c TiltGeometry,
    config: &'c StallGuardConfig,
}

impl<'c> StallGuard<'c> {
    /// Create a guard for the given geometry and settings
    pub fn new(tilt: &'c TiltGeometry, config: &'c StallGuardConfig) -> Self {
        Self { tilt, config }
    }

    /// Check that the tilt rests on its endstop
    ///
    /// The endstop input alone is not trusted: the position counter must
    /// also be within the homing tolerance.
    pub fn check_endstop<M: MotionController>(
        &self,
        motion: &mut M,
    ) -> Result<EndstopState, ActuatorFault> {
        if motion.endstop_reached(Axis::Tilt)? && self.tilt.at_endstop(motion.position(Axis::Tilt)?)
        {
            Ok(EndstopState::Reached)
        } else {
            Ok(EndstopState::NotReached)
        }
    }

    /// Nudge the tilt down until the endstop triggers
    ///
    /// Activates `profile`, then moves down by `step_steps` at a time, at
    /// most `max_attempts` times and never further than the tilt travel. A
    /// nudge hitting its watchdog ends recovery with a fatal timeout.
    pub fn recover<M: MotionController>(
        &self,
        motion: &mut M,
        profile: &MovingProfile,
    ) -> Result<RecoveryOutcome, SeparationError> {
        warn!("Tilt unstucking with {}", profile.name.as_str());
        motion.activate_profile(Axis::Tilt, profile)?;

        let step = self.config.step_steps.max(1) as u32;
        let travel = self.tilt.travel();
        let mut attempts: u16 = 0;
        let mut moved: u32 = 0;

        loop {
            if motion.endstop_reached(Axis::Tilt)? {
                motion.set_position(Axis::Tilt, self.tilt.endstop_position)?;
                info!("Tilt on endstop after {} nudges", attempts);
                return Ok(RecoveryOutcome::Recovered { attempts });
            }
            if attempts >= self.config.max_attempts as u16 || moved >= travel {
                break;
            }
            if motion.move_relative(Axis::Tilt, -(step as i32))? == MoveResult::TimedOut {
                error!("Unstuck nudge {} timed out", attempts + 1);
                return Err(tilt_timeout(true));
            }
            attempts += 1;
            moved += step;
        }

        error!("Tilt unstuck failed after {} nudges", attempts);
        Ok(RecoveryOutcome::Unrecovered { attempts })
    }

    /// Make sure the tilt ended on its endstop after going down
    ///
    /// If the endstop is not active, one settle move slightly past the
    /// endstop position is issued with the active profile (the tilt stops
    /// on the endstop or on the driver's stall detection). If the endstop
    /// is still not confirmed, recovery runs while `budget` allows.
    pub fn ensure_endstop<M: MotionController>(
        &self,
        motion: &mut M,
        recovery: &MovingProfile,
        budget: &mut RecoveryBudget,
    ) -> Result<StallReport, SeparationError> {
        if !motion.endstop_reached(Axis::Tilt)? {
            let settle = self.tilt.endstop_position - self.tilt.homing_tolerance;
            debug!("Tilt settle move to {}", settle);
            if motion.move_to(Axis::Tilt, settle)? == MoveResult::TimedOut {
                warn!("Tilt settle move timed out");
                return Err(tilt_timeout(false));
            }
        }

        let mut report = StallReport::default();
        if self.check_endstop(motion)? == EndstopState::Reached {
            return Ok(report);
        }

        report.detected = true;
        while budget.try_take() {
            report.runs += 1;
            let outcome = self.recover(motion, recovery)?;
            report.attempts = report.attempts.saturating_add(outcome.attempts());
            if let RecoveryOutcome::Recovered { .. } = outcome {
                report.recovered = true;
                break;
            }
        }
        Ok(report)
    }
}
