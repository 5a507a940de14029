//! Test doubles and fixtures shared by the unit tests

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::vec::Vec;

use crate::config::PrinterConfig;
use crate::exposure::AreaFillParameters;
use crate::motion::{Axis, MoveResult};
use crate::profiles::{profile_name, MovingProfile, ProfileName, ProfileParams};
use crate::traits::{ActuatorFault, Clock, MotionController, PhaseRecord, TelemetrySink};

/// A call made on the recording motion controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Activate(Axis, ProfileName),
    MoveTo(Axis, i32),
    MoveRelative(Axis, i32),
    Wait(u32),
    EndstopQuery(Axis),
    Position(Axis),
    SetPosition(Axis, i32),
}

impl Command {
    fn axis(&self) -> Option<Axis> {
        match self {
            Command::Activate(axis, _)
            | Command::MoveTo(axis, _)
            | Command::MoveRelative(axis, _)
            | Command::EndstopQuery(axis)
            | Command::Position(axis)
            | Command::SetPosition(axis, _) => Some(*axis),
            Command::Wait(_) => None,
        }
    }
}

/// Motion controller that records every call and simulates positions
///
/// The tilt endstop is active at or below position 0 unless scripted.
pub struct RecordingMotion {
    pub commands: Vec<Command>,
    pub tilt_position: i32,
    pub tower_position: i32,
    /// Obstruction: tilt moves below this position stop on it
    pub tilt_floor: Option<i32>,
    /// Tilt endstop answers, consumed before the simulated state
    pub endstop_script: VecDeque<bool>,
    /// Tilt endstop never triggers once the script is exhausted
    pub endstop_stuck: bool,
    /// Results for upcoming moves, consumed when the axis matches
    pub scripted: VecDeque<(Axis, MoveResult)>,
    /// Fault returned by the next move
    pub fault: Option<ActuatorFault>,
    /// Fault returned by the next wait
    pub wait_fault: Option<ActuatorFault>,
    /// Raise `abort_flag` when this many moves were issued
    pub abort_after_moves: Option<usize>,
    pub abort_flag: Rc<AtomicBool>,
    moves_done: usize,
}

impl RecordingMotion {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            tilt_position: 4928,
            tower_position: 0,
            tilt_floor: None,
            endstop_script: VecDeque::new(),
            endstop_stuck: false,
            scripted: VecDeque::new(),
            fault: None,
            wait_fault: None,
            abort_after_moves: None,
            abort_flag: Rc::new(AtomicBool::new(false)),
            moves_done: 0,
        }
    }

    /// Script the result of the next move on `axis`
    pub fn script(&mut self, axis: Axis, result: MoveResult) {
        self.scripted.push_back((axis, result));
    }

    /// Count commands matching a predicate
    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Count moves on an axis
    pub fn moves(&self, axis: Axis) -> usize {
        self.count(|c| matches!(c, Command::MoveTo(a, _) | Command::MoveRelative(a, _) if *a == axis))
    }

    /// Count every command addressed to an axis
    pub fn axis_commands(&self, axis: Axis) -> usize {
        self.count(|c| c.axis() == Some(axis))
    }

    fn finish_move(&mut self, axis: Axis, target: i32) -> Result<MoveResult, ActuatorFault> {
        if let Some(fault) = self.fault.take() {
            return Err(fault);
        }
        self.moves_done += 1;
        if self.abort_after_moves == Some(self.moves_done) {
            self.abort_flag.store(true, Ordering::Release);
        }

        if let Some((scripted_axis, result)) = self.scripted.front().copied() {
            if scripted_axis == axis {
                self.scripted.pop_front();
                if result != MoveResult::Reached {
                    return Ok(result);
                }
            }
        }

        match axis {
            Axis::Tilt => match self.tilt_floor {
                Some(floor) if target < floor => {
                    self.tilt_position = floor;
                    Ok(MoveResult::Stopped)
                }
                _ => {
                    self.tilt_position = target;
                    Ok(MoveResult::Reached)
                }
            },
            Axis::Tower => {
                self.tower_position = target;
                Ok(MoveResult::Reached)
            }
        }
    }

    fn current(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Tilt => self.tilt_position,
            Axis::Tower => self.tower_position,
        }
    }
}

impl MotionController for RecordingMotion {
    fn activate_profile(&mut self, axis: Axis, profile: &MovingProfile) -> Result<(), ActuatorFault> {
        self.commands
            .push(Command::Activate(axis, profile.name.clone()));
        Ok(())
    }

    fn move_to(&mut self, axis: Axis, position: i32) -> Result<MoveResult, ActuatorFault> {
        self.commands.push(Command::MoveTo(axis, position));
        self.finish_move(axis, position)
    }

    fn move_relative(&mut self, axis: Axis, delta: i32) -> Result<MoveResult, ActuatorFault> {
        self.commands.push(Command::MoveRelative(axis, delta));
        let target = self.current(axis) + delta;
        self.finish_move(axis, target)
    }

    fn endstop_reached(&mut self, axis: Axis) -> Result<bool, ActuatorFault> {
        self.commands.push(Command::EndstopQuery(axis));
        if axis == Axis::Tower {
            return Ok(false);
        }
        if let Some(reached) = self.endstop_script.pop_front() {
            return Ok(reached);
        }
        Ok(!self.endstop_stuck && self.tilt_position <= 0)
    }

    fn position(&mut self, axis: Axis) -> Result<i32, ActuatorFault> {
        self.commands.push(Command::Position(axis));
        Ok(self.current(axis))
    }

    fn set_position(&mut self, axis: Axis, position: i32) -> Result<(), ActuatorFault> {
        self.commands.push(Command::SetPosition(axis, position));
        match axis {
            Axis::Tilt => self.tilt_position = position,
            Axis::Tower => self.tower_position = position,
        }
        Ok(())
    }

    fn wait(&mut self, duration_ms: u32) -> Result<(), ActuatorFault> {
        self.commands.push(Command::Wait(duration_ms));
        match self.wait_fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Clock advancing by a fixed step on every reading
pub struct FakeClock {
    now: Cell<u64>,
    step: u64,
}

impl FakeClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Telemetry sink keeping every record
#[derive(Default)]
pub struct RecordingTelemetry {
    pub records: Vec<PhaseRecord>,
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&mut self, record: &PhaseRecord) {
        self.records.push(*record);
    }
}

fn params(max: u16, current: u8) -> ProfileParams {
    ProfileParams {
        starting_steprate: (max / 4).max(1),
        maximum_steprate: max,
        acceleration: max,
        deceleration: max,
        current,
        stallguard_threshold: 0,
        coolstep_threshold: 0,
    }
}

/// Printer configuration with the stock tilt and tower profile catalogs
pub fn printer_config() -> PrinterConfig {
    let mut config = PrinterConfig::new();
    let tilt = [
        ("homingFast", 2200, true),
        ("homingSlow", 1000, true),
        ("move120", 120, false),
        ("layer200", 200, false),
        ("move300", 300, false),
        ("layer400", 400, false),
        ("layer600", 600, false),
        ("layer800", 800, false),
        ("layer1000", 1000, false),
        ("layer1250", 1250, false),
        ("layer1500", 1500, false),
        ("layer1750", 1750, false),
        ("layer2000", 2000, false),
        ("layer2250", 2250, false),
        ("move5120", 5120, false),
        ("move8000", 8000, false),
    ];
    for (name, rate, internal) in tilt {
        let profile = MovingProfile::new(name, Axis::Tilt, params(rate, 20)).unwrap();
        let profile = if internal { profile.internal() } else { profile };
        config.profiles.insert(profile).unwrap();
    }

    let tower = [
        ("homingFast", 16000, true),
        ("homingSlow", 4000, true),
        ("moveFast", 16000, true),
        ("moveSlow", 8000, true),
        ("resinSensor", 2000, true),
        ("layer1", 800, false),
        ("layer2", 1600, false),
        ("layer3", 2400, false),
        ("layer4", 3200, false),
        ("layer5", 4000, false),
        ("layer8", 6400, false),
        ("layer11", 8800, false),
        ("layer14", 11200, false),
        ("layer18", 14400, false),
        ("layer22", 17600, false),
        ("layer24", 19200, false),
    ];
    for (name, rate, internal) in tower {
        let profile = MovingProfile::new(name, Axis::Tower, params(rate, 24)).unwrap();
        let profile = if internal { profile.internal() } else { profile };
        config.profiles.insert(profile).unwrap();
    }
    config
}

fn name(name: &str) -> ProfileName {
    profile_name(name).unwrap()
}

/// Parameter set for small layers: quick tilt, no hop
pub fn fast_parameters() -> AreaFillParameters {
    AreaFillParameters {
        delay_before_exposure_ms: 0,
        delay_after_exposure_ms: 0,
        tower_hop_height_nm: 0,
        tower_profile: name("layer22"),
        use_tilt: true,
        tilt_down_initial_profile: name("layer1750"),
        tilt_down_offset_steps: 650,
        tilt_down_offset_delay_ms: 0,
        tilt_down_finish_profile: name("layer1500"),
        tilt_down_cycles: 3,
        tilt_down_delay_ms: 50,
        tilt_up_initial_profile: name("move5120"),
        tilt_up_offset_steps: 400,
        tilt_up_offset_delay_ms: 0,
        tilt_up_finish_profile: name("layer1750"),
        tilt_up_cycles: 1,
        tilt_up_delay_ms: 0,
        moves_time_ms: 5500,
    }
}

/// Parameter set for large layers: slow split tilt and a tower hop
pub fn slow_parameters() -> AreaFillParameters {
    AreaFillParameters {
        delay_before_exposure_ms: 3000,
        delay_after_exposure_ms: 0,
        tower_hop_height_nm: 5_000_000,
        tower_profile: name("layer1"),
        use_tilt: true,
        tilt_down_initial_profile: name("layer400"),
        tilt_down_offset_steps: 1000,
        tilt_down_offset_delay_ms: 1000,
        tilt_down_finish_profile: name("layer200"),
        tilt_down_cycles: 4,
        tilt_down_delay_ms: 100,
        tilt_up_initial_profile: name("layer200"),
        tilt_up_offset_steps: 1000,
        tilt_up_offset_delay_ms: 1000,
        tilt_up_finish_profile: name("layer400"),
        tilt_up_cycles: 2,
        tilt_up_delay_ms: 100,
        moves_time_ms: 12000,
    }
}
