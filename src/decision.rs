// src/decision.rs
//
// The per-vehicle, per-frame violation test. Conditions short-circuit in a
// fixed order; both correctness and cost depend on it (the cheap state
// checks run before any geometry). The strict/non-strict comparisons
// encode the false-positive/false-negative tradeoff and must not drift.

use crate::light_tracker::TrafficLightTracker;
use crate::types::{DetectorConfig, LightState, TrackedVehicle};
use crate::vehicle_state::{VehicleState, ViolationPhase};
use chrono::{DateTime, Utc};
use tracing::debug;

/// A crossing distance this far on the approach side means the vehicle is
/// in another lane or moving against the camera direction; it is skipped
/// without touching its counter.
pub const WRONG_WAY_MARGIN_PX: f32 = -50.0;

/// Output of a confirmed decision; the orchestrator turns it into a
/// [`crate::violation::Violation`].
#[derive(Debug, Clone, Copy)]
pub struct ConfirmedCrossing {
    pub crossing_distance: f32,
    pub red_duration_secs: f64,
}

/// Evaluate one vehicle for this frame. Returns `Some` exactly once per
/// track, on the frame its qualifying-frame counter reaches the threshold.
pub fn evaluate(
    vehicle: &TrackedVehicle,
    state: &mut VehicleState,
    lights: &TrafficLightTracker,
    stop_line_y: f32,
    config: &DetectorConfig,
    frame_number: u64,
    timestamp: DateTime<Utc>,
) -> Option<ConfirmedCrossing> {
    // 1. Terminal state: never re-evaluate a confirmed track.
    if state.is_confirmed() {
        return None;
    }

    // 2. The light must be red. Any other reading resets the counter so a
    // stale partial count cannot silently mature into a violation later.
    if lights.state() != LightState::Red {
        state.phase = ViolationPhase::Watched;
        return None;
    }

    // 3. Grace period after the red anchor. Skip without resetting: the
    // count survives a still-running grace window.
    let red_duration_secs = lights.red_duration_secs(timestamp)?;
    if red_duration_secs < config.grace_period_secs {
        return None;
    }

    // A vehicle already past the line when red began was passing legally.
    if !state.was_before_line_when_red {
        return None;
    }

    // 4. Far on the approach side, or wrong lane / opposite direction.
    let crossing_distance = vehicle.detection.bottom_y() - stop_line_y;
    if crossing_distance < WRONG_WAY_MARGIN_PX {
        return None;
    }

    // 5. Demonstrably past the line, not merely touching it.
    if crossing_distance <= config.stop_line_threshold {
        return None;
    }

    // 6. Debounce against single-frame detector noise.
    let qualifying_frames = state.qualifying_frames() + 1;
    state.phase = ViolationPhase::Confirming { qualifying_frames };
    debug!(
        "Track {}: violation frame {}/{}",
        state.track_id, qualifying_frames, config.min_frames
    );
    if qualifying_frames < config.min_frames {
        return None;
    }

    // 7. Confirmed. Final and append-only from here on.
    state.phase = ViolationPhase::Confirmed {
        frame: frame_number,
    };
    state.crossing_time = Some(timestamp);
    Some(ConfirmedCrossing {
        crossing_distance,
        red_duration_secs,
    })
}
