// src/vehicle_state.rs
//
// Per-track violation progress. One record per track id, created when a
// vehicle first passes the filters and deleted only when the tracker
// retires the track or the light turns green (waiting vehicles are no
// longer at risk). No other component removes state.

use crate::types::{LightState, TrackedVehicle};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Bounded window of recent positions kept per vehicle.
pub const POSITION_HISTORY: usize = 10;

/// Explicit violation progress. Condition order and reset semantics live in
/// the decision engine; this only names the states it moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationPhase {
    /// Light is red (or not yet), no crossing evidence accumulated.
    Watched,
    /// Crossing criteria met for `qualifying_frames` consecutive frames.
    Confirming { qualifying_frames: u32 },
    /// Violation emitted; the track is never evaluated again.
    Confirmed { frame: u64 },
}

#[derive(Debug, Clone)]
pub struct VehicleState {
    pub track_id: u32,
    /// Bottom Y at the instant the light turned red, if the vehicle was
    /// visible then (or appeared during red).
    pub position_when_red_started: Option<f32>,
    /// Only vehicles that were on the approach side of the line when red
    /// began can violate; a vehicle already past it was passing legally.
    pub was_before_line_when_red: bool,
    pub phase: ViolationPhase,
    pub crossing_time: Option<DateTime<Utc>>,
    y_positions: VecDeque<f32>,
    x_positions: VecDeque<f32>,
}

impl VehicleState {
    fn new(track_id: u32) -> Self {
        Self {
            track_id,
            position_when_red_started: None,
            was_before_line_when_red: false,
            phase: ViolationPhase::Watched,
            crossing_time: None,
            y_positions: VecDeque::with_capacity(POSITION_HISTORY),
            x_positions: VecDeque::with_capacity(POSITION_HISTORY),
        }
    }

    pub fn update_position(&mut self, y: f32, x: f32) {
        self.y_positions.push_back(y);
        if self.y_positions.len() > POSITION_HISTORY {
            self.y_positions.pop_front();
        }
        self.x_positions.push_back(x);
        if self.x_positions.len() > POSITION_HISTORY {
            self.x_positions.pop_front();
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.phase, ViolationPhase::Confirmed { .. })
    }

    pub fn qualifying_frames(&self) -> u32 {
        match self.phase {
            ViolationPhase::Confirming { qualifying_frames } => qualifying_frames,
            _ => 0,
        }
    }

    pub fn y_history(&self) -> &VecDeque<f32> {
        &self.y_positions
    }
}

#[derive(Default)]
pub struct VehicleStateStore {
    states: HashMap<u32, VehicleState>,
}

impl VehicleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the state for a track. A vehicle first seen while
    /// the light is already red gets its before/after-line status
    /// snapshotted right here — never retroactively.
    pub fn get_or_create(
        &mut self,
        track_id: u32,
        vehicle_y: f32,
        stop_line_y: f32,
        light: LightState,
    ) -> &mut VehicleState {
        self.states.entry(track_id).or_insert_with(|| {
            let mut state = VehicleState::new(track_id);
            if light == LightState::Red {
                state.position_when_red_started = Some(vehicle_y);
                state.was_before_line_when_red = vehicle_y <= stop_line_y;
            }
            debug!(
                "New vehicle state: track {} at y={vehicle_y} (before_line={})",
                track_id, state.was_before_line_when_red
            );
            state
        })
    }

    /// Runs exactly on the frame a red phase is accepted: every currently
    /// visible vehicle gets its baseline recorded at once, not just newly
    /// created ones.
    pub fn snapshot_red_start(&mut self, vehicles: &[TrackedVehicle], stop_line_y: f32) {
        debug!("📸 Recording vehicle positions at red light start");
        for vehicle in vehicles {
            if !vehicle.detection.class.is_vehicle() {
                continue;
            }
            let y = vehicle.detection.bottom_y();
            let state = self.get_or_create(vehicle.track_id, y, stop_line_y, LightState::Red);
            state.position_when_red_started = Some(y);
            state.was_before_line_when_red = y <= stop_line_y;
        }
    }

    pub fn get_mut(&mut self, track_id: u32) -> Option<&mut VehicleState> {
        self.states.get_mut(&track_id)
    }

    /// Called when the tracker reports the track lost.
    pub fn evict(&mut self, track_id: u32) {
        if self.states.remove(&track_id).is_some() {
            debug!("🗑️  Evicted state for lost track {track_id}");
        }
    }

    /// Green light: vehicles that were waiting are no longer at risk.
    pub fn clear_all(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
