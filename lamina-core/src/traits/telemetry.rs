//! Per-phase telemetry
//!
//! The sequencer emits one [`PhaseRecord`] for every phase it runs, so the
//! separation timing of a print can be reconstructed afterwards.

use crate::sequencer::Phase;

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseOutcome {
    /// All moves and delays of the phase completed
    Completed,
    /// A move hit its watchdog window
    TimedOut,
    /// Stall recovery failed or the actuator reported a fault
    Faulted,
}

/// Timing record of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseRecord {
    /// Layer index (0-based)
    pub layer: u32,
    /// Phase that ran
    pub phase: Phase,
    /// Clock timestamp at phase start (ms)
    pub started_ms: u64,
    /// Measured duration including delays (ms)
    pub duration_ms: u32,
    /// Estimated duration from the profiles' ramps (ms)
    pub estimated_ms: u32,
    /// How the phase ended
    pub outcome: PhaseOutcome,
    /// Endstop was not reached after the tilt went down
    pub stall_detected: bool,
    /// Recovery reached the endstop
    pub stall_recovered: bool,
    /// Recovery nudges issued
    pub recovery_attempts: u16,
}

/// Receiver of phase records
pub trait TelemetrySink {
    /// Record a finished phase
    fn record(&mut self, record: &PhaseRecord);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for &mut T {
    fn record(&mut self, record: &PhaseRecord) {
        (**self).record(record)
    }
}

/// Sink that drops every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&mut self, _record: &PhaseRecord) {}
}

/// Sink that logs every record through defmt
#[cfg(feature = "defmt")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefmtTelemetry;

#[cfg(feature = "defmt")]
impl TelemetrySink for DefmtTelemetry {
    fn record(&mut self, record: &PhaseRecord) {
        defmt::info!(
            "layer {} {}: {} ms (est {} ms) {}",
            record.layer,
            record.phase.name(),
            record.duration_ms,
            record.estimated_ms,
            record.outcome
        );
        if record.stall_detected {
            defmt::warn!(
                "layer {} stall, recovered={} attempts={}",
                record.layer,
                record.stall_recovered,
                record.recovery_attempts
            );
        }
    }
}
