//! Move planning helpers
//!
//! Splitting a stroke into equal sub-moves, and estimating how long a
//! profiled move takes from its trapezoidal ramp. Estimates feed telemetry
//! and the drivers' watchdog window; they never schedule a move.

use crate::profiles::ProfileParams;

/// Fixed margin added to every watchdog window (ms)
pub const WATCHDOG_MARGIN_MS: u32 = 1000;

/// Cumulative sub-move targets splitting `start..end` into `cycles` parts
///
/// The last target is exactly `end`, so rounding never leaves a remainder.
/// A cycle count of 0 is treated as a single move.
pub fn split_travel(start: i32, end: i32, cycles: u8) -> impl Iterator<Item = i32> {
    let parts = cycles.max(1) as i64;
    let span = end as i64 - start as i64;
    (1..=parts).map(move |i| (start as i64 + span * i / parts) as i32)
}

/// Duration of a ramp between two step rates (ms), 0 for an instant ramp
fn ramp_ms(delta_rate: u64, rate_per_s: u64) -> u64 {
    if rate_per_s == 0 {
        0
    } else {
        delta_rate * 1000 / rate_per_s
    }
}

/// Distance covered by a ramp between two step rates (steps)
fn ramp_steps(from: u64, to: u64, rate_per_s: u64) -> u64 {
    if rate_per_s == 0 {
        0
    } else {
        (to * to - from * from) / (2 * rate_per_s)
    }
}

/// Estimate the duration of a move (ms)
///
/// Uses a trapezoidal profile starting and ending at the starting step
/// rate. Short moves that never reach cruise speed use a triangular profile.
/// A profile that cannot move (zero cruise rate) returns `u32::MAX`.
pub fn estimate_move_ms(params: &ProfileParams, distance_steps: u32) -> u32 {
    if distance_steps == 0 {
        return 0;
    }
    let vmax = params.maximum_steprate as u64;
    if vmax == 0 {
        return u32::MAX;
    }
    let v0 = (params.starting_steprate as u64).min(vmax);
    let accel = params.acceleration as u64;
    let decel = params.deceleration as u64;
    let distance = distance_steps as u64;

    let accel_steps = ramp_steps(v0, vmax, accel);
    let decel_steps = ramp_steps(v0, vmax, decel);

    let total_ms = if accel_steps + decel_steps <= distance {
        let cruise_ms = (distance - accel_steps - decel_steps) * 1000 / vmax;
        ramp_ms(vmax - v0, accel) + cruise_ms + ramp_ms(vmax - v0, decel)
    } else {
        // Peak rate where the acceleration and deceleration ramps meet
        let combined = match (accel, decel) {
            (0, d) => d,
            (a, 0) => a,
            (a, d) => a * d / (a + d),
        };
        let peak = (v0 * v0 + 2 * distance * combined).isqrt().clamp(v0.max(1), vmax);
        if peak == v0 {
            distance * 1000 / peak
        } else {
            ramp_ms(peak - v0, accel) + ramp_ms(peak - v0, decel)
        }
    };

    total_ms.min(u32::MAX as u64) as u32
}

/// Watchdog window for a move (ms): twice the estimate plus a fixed margin
pub fn watchdog_ms(params: &ProfileParams, distance_steps: u32) -> u32 {
    estimate_move_ms(params, distance_steps)
        .saturating_mul(2)
        .saturating_add(WATCHDOG_MARGIN_MS)
}
