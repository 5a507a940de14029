//! Motion controller over position steppers
//!
//! Implements the blocking [`MotionController`] used by the separation
//! sequencer on top of two step generators, their endstop inputs, a torque
//! interface and a delay provider.
//!
//! # Move supervision
//!
//! A move is polled every `poll_ms` until one of:
//!
//! - the driver reports a stall: the axis is stopped, `Stopped`
//! - the endstop triggers while moving towards it: the axis is stopped,
//!   `Stopped`
//! - the step generator finishes: `Reached` if on target, else `Stopped`
//! - the watchdog window expires: the axis is stopped, `TimedOut`
//!
//! The window is derived from the active profile's ramp (see
//! [`watchdog_ms`]).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use lamina_core::config::{PrinterConfig, TiltGeometry, TowerGeometry};
use lamina_core::motion::{watchdog_ms, Axis, MoveResult};
use lamina_core::profiles::{MovingProfile, ProfileParams};
use lamina_core::traits::{
    ActuatorFault, MotionController, PositionStepperDriver, RampConfig, TorqueControl,
};

use super::endstop::EndstopInput;

/// Default completion polling interval (ms)
pub const DEFAULT_POLL_MS: u32 = 1;

/// One axis: step generator, optional endstop and the active profile
pub struct AxisDrive<S, P> {
    stepper: S,
    endstop: Option<EndstopInput<P>>,
    params: Option<ProfileParams>,
}

impl<S: PositionStepperDriver, P: InputPin> AxisDrive<S, P> {
    /// Axis with an endstop switch
    pub fn new(stepper: S, endstop: EndstopInput<P>) -> Self {
        Self {
            stepper,
            endstop: Some(endstop),
            params: None,
        }
    }

    /// Axis without an endstop switch
    pub fn without_endstop(stepper: S) -> Self {
        Self {
            stepper,
            endstop: None,
            params: None,
        }
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn stepper_mut(&mut self) -> &mut S {
        &mut self.stepper
    }

    /// Parameters of the active profile, if one was activated
    pub fn active_profile(&self) -> Option<&ProfileParams> {
        self.params.as_ref()
    }

    fn endstop_triggered(&mut self) -> Result<bool, ActuatorFault> {
        match self.endstop.as_mut() {
            Some(endstop) => endstop.is_triggered(),
            None => Ok(false),
        }
    }
}

/// Two-axis motion controller
pub struct StepperMotionController<S, P, Q, D> {
    tilt: AxisDrive<S, P>,
    tower: AxisDrive<S, P>,
    torque: Q,
    delay: D,
    tilt_geometry: TiltGeometry,
    tower_geometry: TowerGeometry,
    poll_ms: u32,
}

impl<S, P, Q, D> StepperMotionController<S, P, Q, D>
where
    S: PositionStepperDriver,
    P: InputPin,
    Q: TorqueControl,
    D: DelayNs,
{
    /// Create a controller for the printer's geometry
    pub fn new(
        tilt: AxisDrive<S, P>,
        tower: AxisDrive<S, P>,
        torque: Q,
        delay: D,
        config: &PrinterConfig,
    ) -> Self {
        Self {
            tilt,
            tower,
            torque,
            delay,
            tilt_geometry: config.tilt,
            tower_geometry: config.tower,
            poll_ms: DEFAULT_POLL_MS,
        }
    }

    /// Set the completion polling interval (ms, at least 1)
    pub fn with_poll_interval(mut self, poll_ms: u32) -> Self {
        self.poll_ms = poll_ms.max(1);
        self
    }

    pub fn drive(&self, axis: Axis) -> &AxisDrive<S, P> {
        match axis {
            Axis::Tilt => &self.tilt,
            Axis::Tower => &self.tower,
        }
    }

    pub fn drive_mut(&mut self, axis: Axis) -> &mut AxisDrive<S, P> {
        match axis {
            Axis::Tilt => &mut self.tilt,
            Axis::Tower => &mut self.tower,
        }
    }

    pub fn torque(&self) -> &Q {
        &self.torque
    }

    /// Controller position units to microsteps
    fn to_steps(&self, axis: Axis, position: i32) -> i32 {
        match axis {
            Axis::Tilt => position,
            Axis::Tower => self.tower_geometry.nm_to_steps(position),
        }
    }

    fn from_steps(&self, axis: Axis, steps: i32) -> i32 {
        match axis {
            Axis::Tilt => steps,
            Axis::Tower => self.tower_geometry.steps_to_nm(steps),
        }
    }

    /// Start a move in microsteps and supervise it to completion
    fn run_move(&mut self, axis: Axis, target: i32) -> Result<MoveResult, ActuatorFault> {
        let poll_ms = self.poll_ms;
        let Self {
            tilt, tower, delay, ..
        } = self;
        let drive = match axis {
            Axis::Tilt => tilt,
            Axis::Tower => tower,
        };

        let params = drive.params.ok_or(ActuatorFault::NotHomed)?;
        if drive.stepper.is_moving() {
            return Err(ActuatorFault::Busy);
        }

        let start = drive.stepper.position();
        let distance = target.abs_diff(start);
        let window = watchdog_ms(&params, distance);
        trace!("{} move to {} ({} steps, window {} ms)", axis, target, distance, window);

        // Endstops sit at the low end of the travel
        let towards_endstop = target < start;
        if towards_endstop && drive.endstop_triggered()? {
            debug!("{} already on endstop at {}", axis, start);
            return Ok(MoveResult::Stopped);
        }

        drive.stepper.clear_stall();
        drive.stepper.start_move(target)?;

        let mut elapsed = 0u32;
        loop {
            if drive.stepper.is_stalled() {
                drive.stepper.stop();
                drive.stepper.clear_stall();
                warn!("{} stalled at {}", axis, drive.stepper.position());
                return Ok(MoveResult::Stopped);
            }
            if towards_endstop && drive.endstop_triggered()? {
                drive.stepper.stop();
                debug!("{} endstop at {}", axis, drive.stepper.position());
                return Ok(MoveResult::Stopped);
            }
            if !drive.stepper.is_moving() {
                return Ok(if drive.stepper.position() == target {
                    MoveResult::Reached
                } else {
                    MoveResult::Stopped
                });
            }
            if elapsed >= window {
                drive.stepper.stop();
                warn!("{} move timed out after {} ms", axis, elapsed);
                return Ok(MoveResult::TimedOut);
            }
            delay.delay_ms(poll_ms);
            elapsed = elapsed.saturating_add(poll_ms);
        }
    }
}

impl<S, P, Q, D> MotionController for StepperMotionController<S, P, Q, D>
where
    S: PositionStepperDriver,
    P: InputPin,
    Q: TorqueControl,
    D: DelayNs,
{
    fn activate_profile(
        &mut self,
        axis: Axis,
        profile: &MovingProfile,
    ) -> Result<(), ActuatorFault> {
        let drive = self.drive_mut(axis);
        if drive.stepper.is_moving() {
            return Err(ActuatorFault::Busy);
        }
        drive.stepper.configure_ramp(RampConfig::from(&profile.params))?;
        self.torque.apply(axis, profile)?;
        self.drive_mut(axis).params = Some(profile.params);
        Ok(())
    }

    fn move_to(&mut self, axis: Axis, position: i32) -> Result<MoveResult, ActuatorFault> {
        if axis == Axis::Tilt && position > self.tilt_geometry.max_position {
            return Err(ActuatorFault::OutOfBounds);
        }
        let target = self.to_steps(axis, position);
        self.run_move(axis, target)
    }

    fn move_relative(&mut self, axis: Axis, delta: i32) -> Result<MoveResult, ActuatorFault> {
        let current = self.position(axis)?;
        self.move_to(axis, current.saturating_add(delta))
    }

    fn endstop_reached(&mut self, axis: Axis) -> Result<bool, ActuatorFault> {
        self.drive_mut(axis)
            .endstop
            .as_mut()
            .ok_or(ActuatorFault::NoEndstop)?
            .is_triggered()
    }

    fn position(&mut self, axis: Axis) -> Result<i32, ActuatorFault> {
        let steps = self.drive(axis).stepper.position();
        Ok(self.from_steps(axis, steps))
    }

    fn set_position(&mut self, axis: Axis, position: i32) -> Result<(), ActuatorFault> {
        let steps = self.to_steps(axis, position);
        let drive = self.drive_mut(axis);
        if drive.stepper.is_moving() {
            return Err(ActuatorFault::Busy);
        }
        drive.stepper.set_position(steps);
        Ok(())
    }

    fn wait(&mut self, duration_ms: u32) -> Result<(), ActuatorFault> {
        if duration_ms > 0 {
            self.delay.delay_ms(duration_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::endstop::tests::MockPin;
    use core::cell::Cell;
    use lamina_core::traits::StepperError;

    /// Step generator advancing `speed` steps on every poll
    struct SimStepper {
        position: Cell<i32>,
        target: Cell<i32>,
        speed: i32,
        stall_at: Option<i32>,
        stalled: Cell<bool>,
        ramp: Option<RampConfig>,
        stops: usize,
    }

    impl SimStepper {
        fn at(position: i32, speed: i32) -> Self {
            Self {
                position: Cell::new(position),
                target: Cell::new(position),
                speed,
                stall_at: None,
                stalled: Cell::new(false),
                ramp: None,
                stops: 0,
            }
        }
    }

    impl PositionStepperDriver for SimStepper {
        fn configure_ramp(&mut self, ramp: RampConfig) -> Result<(), StepperError> {
            self.ramp = Some(ramp);
            Ok(())
        }

        fn start_move(&mut self, target: i32) -> Result<(), StepperError> {
            self.target.set(target);
            Ok(())
        }

        fn position(&self) -> i32 {
            self.position.get()
        }

        fn set_position(&mut self, position: i32) {
            self.position.set(position);
            self.target.set(position);
        }

        fn is_moving(&self) -> bool {
            let (position, target) = (self.position.get(), self.target.get());
            if position == target {
                return false;
            }
            let step = (target - position).clamp(-self.speed, self.speed);
            let mut next = position + step;
            if let Some(limit) = self.stall_at {
                if step < 0 && next <= limit {
                    next = limit;
                    self.stalled.set(true);
                }
            }
            self.position.set(next);
            true
        }

        fn stop(&mut self) {
            self.target.set(self.position.get());
            self.stops += 1;
        }

        fn is_stalled(&self) -> bool {
            self.stalled.get()
        }

        fn clear_stall(&mut self) {
            self.stalled.set(false);
        }
    }

    #[derive(Default)]
    struct RecordingTorque {
        applied: Vec<Axis>,
    }

    impl TorqueControl for RecordingTorque {
        fn apply(&mut self, axis: Axis, _profile: &MovingProfile) -> Result<(), StepperError> {
            self.applied.push(axis);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        total_ns: u64,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ns += ms as u64 * 1_000_000;
        }
    }

    impl MockDelay {
        fn total_ms(&self) -> u64 {
            self.total_ns / 1_000_000
        }
    }

    type TestController = StepperMotionController<SimStepper, MockPin, RecordingTorque, MockDelay>;

    fn controller() -> TestController {
        StepperMotionController::new(
            AxisDrive::new(
                SimStepper::at(4928, 100),
                EndstopInput::active_low(MockPin::fixed(true)),
            ),
            AxisDrive::without_endstop(SimStepper::at(0, 100)),
            RecordingTorque::default(),
            MockDelay::default(),
            &PrinterConfig::new(),
        )
    }

    fn profile(axis: Axis) -> MovingProfile {
        let params = ProfileParams {
            starting_steprate: 100,
            maximum_steprate: 400,
            acceleration: 200,
            deceleration: 200,
            current: 20,
            stallguard_threshold: 47,
            coolstep_threshold: 0,
        };
        MovingProfile::new("layer400", axis, params).unwrap()
    }

    #[test]
    fn test_move_reaches_target() {
        let mut ctl = controller();
        let layer400 = profile(Axis::Tilt);
        ctl.activate_profile(Axis::Tilt, &layer400).unwrap();

        assert_eq!(ctl.move_to(Axis::Tilt, 4028), Ok(MoveResult::Reached));
        assert_eq!(ctl.position(Axis::Tilt), Ok(4028));
        assert_eq!(
            ctl.drive(Axis::Tilt).stepper().ramp,
            Some(RampConfig::from(&layer400.params))
        );
        assert_eq!(ctl.torque().applied, vec![Axis::Tilt]);
        // 900 steps at 100 per poll, one poll interval between polls
        assert_eq!(ctl.delay.total_ms(), 9);
    }

    #[test]
    fn test_move_without_profile() {
        let mut ctl = controller();
        assert_eq!(
            ctl.move_to(Axis::Tilt, 0),
            Err(ActuatorFault::NotHomed)
        );
    }

    #[test]
    fn test_tower_nanometres() {
        let mut ctl = controller();
        ctl.activate_profile(Axis::Tower, &profile(Axis::Tower))
            .unwrap();

        assert_eq!(ctl.move_to(Axis::Tower, 50_000), Ok(MoveResult::Reached));
        assert_eq!(ctl.drive(Axis::Tower).stepper().position(), 40);
        assert_eq!(ctl.position(Axis::Tower), Ok(50_000));

        assert_eq!(
            ctl.move_relative(Axis::Tower, -2_500),
            Ok(MoveResult::Reached)
        );
        assert_eq!(ctl.position(Axis::Tower), Ok(47_500));

        ctl.set_position(Axis::Tower, 0).unwrap();
        assert_eq!(ctl.drive(Axis::Tower).stepper().position(), 0);
    }

    #[test]
    fn test_stall_stops_axis() {
        let mut ctl = controller();
        ctl.drive_mut(Axis::Tilt).stepper_mut().stall_at = Some(1000);
        ctl.activate_profile(Axis::Tilt, &profile(Axis::Tilt)).unwrap();

        assert_eq!(ctl.move_to(Axis::Tilt, 0), Ok(MoveResult::Stopped));

        let stepper = ctl.drive(Axis::Tilt).stepper();
        assert_eq!(stepper.position(), 1000);
        assert_eq!(stepper.stops, 1);
        assert!(!stepper.is_stalled());
    }

    #[test]
    fn test_endstop_stops_move_down() {
        let mut ctl = controller();
        // Normally open switch closes on the fifth read
        let switch = EndstopInput::active_low(MockPin::flipping(true, 4));
        ctl.drive_mut(Axis::Tilt).endstop = Some(switch);
        ctl.activate_profile(Axis::Tilt, &profile(Axis::Tilt)).unwrap();

        assert_eq!(ctl.move_to(Axis::Tilt, -96), Ok(MoveResult::Stopped));
        let stepper = ctl.drive(Axis::Tilt).stepper();
        assert_eq!(stepper.position(), 4628);
        assert_eq!(stepper.stops, 1);
        assert_eq!(ctl.delay.total_ms(), 3);
    }

    #[test]
    fn test_active_endstop_blocks_move_down() {
        let mut ctl = controller();
        let closed = EndstopInput::active_low(MockPin::fixed(false));
        ctl.drive_mut(Axis::Tilt).endstop = Some(closed);
        ctl.set_position(Axis::Tilt, 500).unwrap();
        ctl.activate_profile(Axis::Tilt, &profile(Axis::Tilt)).unwrap();

        assert_eq!(ctl.move_to(Axis::Tilt, -96), Ok(MoveResult::Stopped));
        assert_eq!(ctl.position(Axis::Tilt), Ok(500));
        assert_eq!(
            ctl.move_relative(Axis::Tilt, -128),
            Ok(MoveResult::Stopped)
        );
        assert_eq!(ctl.position(Axis::Tilt), Ok(500));

        // Leaving the endstop is allowed
        assert_eq!(ctl.move_to(Axis::Tilt, 1000), Ok(MoveResult::Reached));
        assert_eq!(ctl.position(Axis::Tilt), Ok(1000));
    }

    #[test]
    fn test_watchdog_expiry() {
        let mut ctl = controller();
        ctl.drive_mut(Axis::Tilt).stepper_mut().speed = 0;
        let layer400 = profile(Axis::Tilt);
        ctl.activate_profile(Axis::Tilt, &layer400).unwrap();

        assert_eq!(ctl.move_to(Axis::Tilt, 3928), Ok(MoveResult::TimedOut));
        assert_eq!(
            ctl.delay.total_ms(),
            watchdog_ms(&layer400.params, 1000) as u64
        );
        assert_eq!(ctl.drive(Axis::Tilt).stepper().stops, 1);
        assert_eq!(ctl.position(Axis::Tilt), Ok(4928));
    }

    #[test]
    fn test_profile_change_while_moving() {
        let mut ctl = controller();
        ctl.drive_mut(Axis::Tilt).stepper_mut().speed = 0;
        ctl.drive_mut(Axis::Tilt)
            .stepper_mut()
            .start_move(0)
            .unwrap();

        assert_eq!(
            ctl.activate_profile(Axis::Tilt, &profile(Axis::Tilt)),
            Err(ActuatorFault::Busy)
        );
        assert!(ctl.torque().applied.is_empty());
        assert!(ctl.drive(Axis::Tilt).active_profile().is_none());
    }

    #[test]
    fn test_tilt_upper_limit() {
        let mut ctl = controller();
        ctl.activate_profile(Axis::Tilt, &profile(Axis::Tilt)).unwrap();
        assert_eq!(
            ctl.move_to(Axis::Tilt, 7000),
            Err(ActuatorFault::OutOfBounds)
        );
    }

    #[test]
    fn test_endstops() {
        let mut ctl = controller();
        assert_eq!(ctl.endstop_reached(Axis::Tilt), Ok(false));
        assert_eq!(
            ctl.endstop_reached(Axis::Tower),
            Err(ActuatorFault::NoEndstop)
        );
    }

    #[test]
    fn test_wait() {
        let mut ctl = controller();
        assert_eq!(ctl.wait(0), Ok(()));
        assert_eq!(ctl.delay.total_ns, 0);
        assert_eq!(ctl.wait(250), Ok(()));
        assert_eq!(ctl.delay.total_ms(), 250);
    }
}
