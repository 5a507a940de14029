//! Separation plan interpreter
//!
//! Runs the phases of a [`SeparationPlan`] in order against a
//! [`MotionController`], supervising the tilt endstop after every tilt-down
//! and emitting one telemetry record per phase. The abort signal is only
//! checked between phases.

use heapless::Vec;

use super::error::SeparationError;
use super::plan::{
    Phase, PhaseDescriptor, PhaseStep, SeparationPlan, TiltStroke, TowerMove, MAX_PHASES,
};
use crate::config::PrinterConfig;
use crate::exposure::AreaFillParameters;
use crate::motion::{Axis, LayerTarget, MoveResult};
use crate::profiles::MovingProfile;
use crate::safety::{RecoveryBudget, StallGuard, StallReport};
use crate::traits::{
    AbortSignal, ActuatorFault, Clock, MotionController, PhaseOutcome, PhaseRecord, TelemetrySink,
};

/// Summary of a separation run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SeparationReport {
    /// Layer index (0-based)
    pub layer: u32,
    /// Phases that ran to completion, in order
    pub completed: Vec<Phase, MAX_PHASES>,
    /// A tilt-down did not reach the endstop by itself
    pub stall_detected: bool,
    /// Recovery runs started
    pub recoveries: u8,
    /// Recovery nudges issued
    pub recovery_attempts: u16,
}

/// Outcome of one separation run, handed to the print engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayerSeparationResult {
    /// Every planned phase completed
    Completed(SeparationReport),
    /// Operator abort honoured between phases
    Aborted(SeparationReport),
    /// A phase failed; the layer is not separated
    Fault(SeparationError),
}

impl LayerSeparationResult {
    /// Check if the run completed
    pub fn is_completed(&self) -> bool {
        matches!(self, LayerSeparationResult::Completed(_))
    }

    /// The report of a completed or aborted run
    pub fn report(&self) -> Option<&SeparationReport> {
        match self {
            LayerSeparationResult::Completed(report) | LayerSeparationResult::Aborted(report) => {
                Some(report)
            }
            LayerSeparationResult::Fault(_) => None,
        }
    }
}

/// Transient state of one separation run
#[derive(Debug, Clone)]
pub struct SequencerState {
    /// Phase being executed
    pub phase: Option<Phase>,
    /// Sub-move index within the phase (1-based, 0 = offset move)
    pub cycle: u8,
    /// Last observed endstop condition after a tilt-down
    pub endstop_reached: Option<bool>,
    /// Recovery already ran in the current phase
    pub recovery_ran_in_phase: bool,
    /// Stall supervision of the current phase
    pub phase_stall: StallReport,
    /// Phases completed so far
    pub completed: Vec<Phase, MAX_PHASES>,
    stall_detected: bool,
    recoveries: u8,
    recovery_attempts: u16,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencerState {
    /// Fresh state for a run
    pub fn new() -> Self {
        Self {
            phase: None,
            cycle: 0,
            endstop_reached: None,
            recovery_ran_in_phase: false,
            phase_stall: StallReport::default(),
            completed: Vec::new(),
            stall_detected: false,
            recoveries: 0,
            recovery_attempts: 0,
        }
    }

    fn begin(&mut self, phase: Phase) {
        self.phase = Some(phase);
        self.cycle = 0;
        self.recovery_ran_in_phase = false;
        self.phase_stall = StallReport::default();
    }

    fn note_stall(&mut self, report: StallReport) {
        self.endstop_reached = Some(report.at_endstop());
        self.phase_stall = report;
        self.recovery_ran_in_phase |= report.runs > 0;
        self.stall_detected |= report.detected;
        self.recoveries = self.recoveries.saturating_add(report.runs);
        self.recovery_attempts = self.recovery_attempts.saturating_add(report.attempts);
    }

    fn complete(&mut self) {
        if let Some(phase) = self.phase.take() {
            // Capacity matches the plan
            let _ = self.completed.push(phase);
        }
    }

    fn report(&self, layer: u32) -> SeparationReport {
        SeparationReport {
            layer,
            completed: self.completed.clone(),
            stall_detected: self.stall_detected,
            recoveries: self.recoveries,
            recovery_attempts: self.recovery_attempts,
        }
    }
}

/// How a move ended, from the stroke's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Continue,
    StoppedEarly,
}

/// Layer separation sequencer
///
/// Owns the motion controller, telemetry sink and clock for the job; the
/// configuration snapshot is borrowed for the whole job.
pub struct Sequencer<'c, M, T, C> {
    config: &'c PrinterConfig,
    motion: M,
    telemetry: T,
    clock: C,
    /// Last tower position this sequencer commanded (nm)
    tower_nm: Option<i32>,
}

impl<'c, M, T, C> Sequencer<'c, M, T, C>
where
    M: MotionController,
    T: TelemetrySink,
    C: Clock,
{
    /// Create a sequencer
    pub fn new(config: &'c PrinterConfig, motion: M, telemetry: T, clock: C) -> Self {
        Self {
            config,
            motion,
            telemetry,
            clock,
            tower_nm: None,
        }
    }

    /// Configuration snapshot
    pub fn config(&self) -> &'c PrinterConfig {
        self.config
    }

    /// Motion controller
    pub fn motion(&self) -> &M {
        &self.motion
    }

    /// Motion controller, for moves outside of a separation (homing)
    pub fn motion_mut(&mut self) -> &mut M {
        &mut self.motion
    }

    /// Telemetry sink
    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    /// Tell the sequencer where the tower is, e.g. after homing
    pub fn set_tower_position(&mut self, position_nm: i32) {
        self.tower_nm = Some(position_nm);
    }

    /// Release the owned parts
    pub fn into_parts(self) -> (M, T, C) {
        (self.motion, self.telemetry, self.clock)
    }

    /// Fresh per-layer recovery budget from the configuration
    pub fn recovery_budget(&self) -> RecoveryBudget {
        RecoveryBudget::new(self.config.stall_guard.max_recoveries_per_layer)
    }

    /// Separate one layer
    ///
    /// `target` is where the tower has to be for the next layer. All
    /// profiles are resolved before the first move. Stall recovery gets a
    /// fresh budget; see [`Sequencer::separate_layer_with_budget`] for
    /// retries of a layer.
    pub fn separate_layer<A: AbortSignal + ?Sized>(
        &mut self,
        layer: u32,
        params: &AreaFillParameters,
        target: LayerTarget,
        abort: &A,
    ) -> LayerSeparationResult {
        let mut budget = self.recovery_budget();
        self.separate_layer_with_budget(layer, params, target, &mut budget, abort)
    }

    /// Separate one layer, drawing recovery runs from `budget`
    ///
    /// Every attempt at the same layer must pass the same budget, so a
    /// retried layer cannot recover more often than configured.
    pub fn separate_layer_with_budget<A: AbortSignal + ?Sized>(
        &mut self,
        layer: u32,
        params: &AreaFillParameters,
        target: LayerTarget,
        budget: &mut RecoveryBudget,
        abort: &A,
    ) -> LayerSeparationResult {
        match SeparationPlan::for_layer(params, self.config, target) {
            Ok(plan) => {
                debug!("Layer {}: {} phases", layer, plan.phases().len());
                self.run(layer, &plan, budget, abort)
            }
            Err(err) => {
                error!("Layer {} plan rejected: {}", layer, err);
                LayerSeparationResult::Fault(err)
            }
        }
    }

    /// Stir the resin with `moves` tilt down/up pairs
    ///
    /// Uses the strokes of `params` and ends with the configured settling
    /// pause. Does nothing when the parameter set does not use the tilt.
    pub fn stir_resin<A: AbortSignal + ?Sized>(
        &mut self,
        params: &AreaFillParameters,
        moves: u8,
        abort: &A,
    ) -> LayerSeparationResult {
        let plan = match SeparationPlan::for_stirring(params, self.config, moves) {
            Ok(plan) => plan,
            Err(err) => return LayerSeparationResult::Fault(err),
        };
        if plan.is_empty() {
            return LayerSeparationResult::Completed(SequencerState::new().report(0));
        }
        info!("Stirring resin, {} moves", moves);
        let mut budget = self.recovery_budget();
        let result = self.run(0, &plan, &mut budget, abort);
        if result.is_completed() {
            if let Err(fault) = self.motion.wait(self.config.stirring.delay_ms) {
                return LayerSeparationResult::Fault(fault.into());
            }
        }
        result
    }

    /// Interpret a plan
    fn run<A: AbortSignal + ?Sized>(
        &mut self,
        layer: u32,
        plan: &SeparationPlan<'c>,
        budget: &mut RecoveryBudget,
        abort: &A,
    ) -> LayerSeparationResult {
        let mut state = SequencerState::new();

        for descriptor in plan.phases() {
            if abort.abort_requested() {
                info!("Layer {} aborted before {}", layer, descriptor.phase.name());
                return LayerSeparationResult::Aborted(state.report(layer));
            }

            state.begin(descriptor.phase);
            let estimated_ms = descriptor.estimate_ms(self.config, self.tower_nm);
            let started_ms = self.clock.now_ms();
            let outcome = self.run_phase(descriptor, plan.recovery_profile(), budget, &mut state);
            let duration_ms = self.clock.now_ms().saturating_sub(started_ms);

            self.telemetry.record(&PhaseRecord {
                layer,
                phase: descriptor.phase,
                started_ms,
                duration_ms: duration_ms.min(u32::MAX as u64) as u32,
                estimated_ms,
                outcome: match outcome {
                    Ok(()) => PhaseOutcome::Completed,
                    Err(SeparationError::MotionTimeout { .. }) => PhaseOutcome::TimedOut,
                    Err(_) => PhaseOutcome::Faulted,
                },
                stall_detected: state.phase_stall.detected,
                stall_recovered: state.phase_stall.recovered,
                recovery_attempts: state.phase_stall.attempts,
            });

            if let Err(err) = outcome {
                error!(
                    "Layer {} {} failed at cycle {}: {}",
                    layer,
                    descriptor.phase.name(),
                    state.cycle,
                    err
                );
                return LayerSeparationResult::Fault(err);
            }
            state.complete();
        }

        if abort.abort_requested() {
            info!("Layer {} aborted after separation", layer);
            return LayerSeparationResult::Aborted(state.report(layer));
        }
        LayerSeparationResult::Completed(state.report(layer))
    }

    fn run_phase(
        &mut self,
        descriptor: &PhaseDescriptor<'c>,
        recovery: Option<&'c MovingProfile>,
        budget: &mut RecoveryBudget,
        state: &mut SequencerState,
    ) -> Result<(), SeparationError> {
        match descriptor.step {
            PhaseStep::Tilt(stroke) => {
                self.run_stroke(descriptor.phase, &stroke, recovery, budget, state)
            }
            PhaseStep::Tower { profile, motion } => {
                self.run_tower(descriptor.phase, profile, motion, state)
            }
        }
    }

    fn run_stroke(
        &mut self,
        phase: Phase,
        stroke: &TiltStroke<'c>,
        recovery: Option<&'c MovingProfile>,
        budget: &mut RecoveryBudget,
        state: &mut SequencerState,
    ) -> Result<(), SeparationError> {
        self.motion.activate_profile(Axis::Tilt, stroke.initial)?;
        let result = self.motion.move_to(Axis::Tilt, stroke.offset_target)?;
        let mut progress = self.check_move(phase, Axis::Tilt, result, state)?;

        if progress == Progress::Continue {
            self.motion.wait(stroke.offset_delay_ms)?;
            self.motion.activate_profile(Axis::Tilt, stroke.finish)?;

            for (index, target) in stroke.sub_moves().enumerate() {
                if index > 0 {
                    self.motion.wait(stroke.cycle_delay_ms)?;
                }
                state.cycle = index as u8 + 1;
                let result = self.motion.move_to(Axis::Tilt, target)?;
                progress = self.check_move(phase, Axis::Tilt, result, state)?;
                if progress == Progress::StoppedEarly {
                    break;
                }
            }
        }

        if progress == Progress::StoppedEarly {
            debug!("Tilt stopped early in cycle {}", state.cycle);
        }

        if phase == Phase::TiltDown {
            let recovery = recovery.ok_or(SeparationError::ProfileNotFound(Axis::Tilt))?;
            let guard = StallGuard::new(&self.config.tilt, &self.config.stall_guard);
            let report = match guard.ensure_endstop(&mut self.motion, recovery, budget) {
                Ok(report) => report,
                Err(err) => {
                    if matches!(err, SeparationError::MotionTimeout { recovery_ran: true, .. }) {
                        state.note_stall(StallReport {
                            detected: true,
                            runs: 1,
                            ..StallReport::default()
                        });
                    }
                    return Err(err);
                }
            };
            state.note_stall(report);
            if !report.at_endstop() {
                return Err(SeparationError::StallUnrecovered);
            }
        }
        Ok(())
    }

    fn run_tower(
        &mut self,
        phase: Phase,
        profile: &MovingProfile,
        motion: TowerMove,
        state: &mut SequencerState,
    ) -> Result<(), SeparationError> {
        self.motion.activate_profile(Axis::Tower, profile)?;
        let result = match motion {
            TowerMove::Relative(delta) => self.motion.move_relative(Axis::Tower, delta)?,
            TowerMove::Absolute(position) => self.motion.move_to(Axis::Tower, position)?,
        };
        self.check_move(phase, Axis::Tower, result, state)?;

        self.tower_nm = match motion {
            TowerMove::Relative(delta) => self.tower_nm.map(|nm| nm.saturating_add(delta)),
            TowerMove::Absolute(position) => Some(position),
        };
        Ok(())
    }

    /// Map a move result to the stroke's progress or an error
    ///
    /// Only a tilt-down may stop early; anywhere else an early stop is a
    /// stall.
    fn check_move(
        &self,
        phase: Phase,
        axis: Axis,
        result: MoveResult,
        state: &SequencerState,
    ) -> Result<Progress, SeparationError> {
        match result {
            MoveResult::Reached => Ok(Progress::Continue),
            MoveResult::Stopped if phase == Phase::TiltDown => Ok(Progress::StoppedEarly),
            MoveResult::Stopped => {
                warn!("{} stopped early in {}", axis.name(), phase.name());
                Err(SeparationError::Actuator(ActuatorFault::Stalled))
            }
            MoveResult::TimedOut => {
                warn!("{} timed out in {}", axis.name(), phase.name());
                Err(SeparationError::MotionTimeout {
                    phase,
                    axis,
                    recovery_ran: state.recovery_ran_in_phase,
                })
            }
        }
    }
}
