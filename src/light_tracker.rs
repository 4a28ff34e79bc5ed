// src/light_tracker.rs
//
// Debounced traffic light belief. Per-frame light detections are noisy
// (flicker between colors, momentary misclassification), so raw labels go
// through a fixed-size vote window before the believed state changes.

use crate::types::{Detection, LightState};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Number of recent raw labels used for majority voting.
pub const VOTE_WINDOW: usize = 5;
/// Votes a label needs within the window to become the new state.
pub const VOTE_MAJORITY: usize = 3;

/// A RED→YELLOW reading this early into the red phase is treated as a
/// detector blip, not a real transition.
const FLICKER_SUPPRESS_SECS: f64 = 2.0;
/// A YELLOW→RED bounce within this window keeps the original red anchor so
/// red-duration accounting does not restart from a misclassification.
const RED_ANCHOR_REUSE_SECS: f64 = 5.0;

pub struct TrafficLightTracker {
    state: LightState,
    confidence: f32,
    history: VecDeque<LightState>,
    last_change: Option<DateTime<Utc>>,
    red_start_time: Option<DateTime<Utc>>,
    red_start_frame: Option<u64>,
    /// Normalized horizontal center of the most recent red light detection,
    /// used by the lane filter to tell controlled traffic from oncoming.
    red_light_center_x: Option<f32>,
}

impl TrafficLightTracker {
    pub fn new() -> Self {
        Self {
            state: LightState::Unknown,
            confidence: 0.0,
            history: VecDeque::with_capacity(VOTE_WINDOW),
            last_change: None,
            red_start_time: None,
            red_start_frame: None,
            red_light_center_x: None,
        }
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn red_start_time(&self) -> Option<DateTime<Utc>> {
        self.red_start_time
    }

    pub fn red_start_frame(&self) -> Option<u64> {
        self.red_start_frame
    }

    pub fn red_light_center_x(&self) -> Option<f32> {
        self.red_light_center_x
    }

    /// True exactly on the frame where the current red phase was accepted.
    pub fn red_started_at(&self, frame_index: u64) -> bool {
        self.state == LightState::Red && self.red_start_frame == Some(frame_index)
    }

    /// Seconds the light has been red, if a red anchor exists.
    pub fn red_duration_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.red_start_time
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Ingest all light-class detections for one frame. No detections means
    /// no change: the belief freezes rather than decaying, and once a state
    /// is established it is never demoted back to UNKNOWN.
    pub fn observe(
        &mut self,
        detections: &[Detection],
        frame_width: u32,
        timestamp: DateTime<Utc>,
        frame_index: u64,
    ) {
        let best = detections
            .iter()
            .filter(|d| d.class.is_light())
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let Some(best) = best else {
            return;
        };
        let Some(raw) = LightState::from_class(best.class) else {
            return;
        };

        if raw == LightState::Red && frame_width > 0 {
            self.red_light_center_x = Some(best.center().0 / frame_width as f32);
        }

        self.confidence = best.confidence;
        self.history.push_back(raw);
        if self.history.len() > VOTE_WINDOW {
            self.history.pop_front();
        }

        if self.history.len() < VOTE_WINDOW {
            return;
        }

        let mut votes: HashMap<LightState, usize> = HashMap::new();
        for &label in &self.history {
            *votes.entry(label).or_insert(0) += 1;
        }
        let Some((&candidate, &count)) = votes.iter().max_by_key(|(_, count)| **count) else {
            return;
        };

        if count >= VOTE_MAJORITY && candidate != self.state {
            self.transition(candidate, timestamp, frame_index);
        }
    }

    fn transition(&mut self, candidate: LightState, timestamp: DateTime<Utc>, frame_index: u64) {
        let old = self.state;

        if old == LightState::Red && candidate == LightState::Yellow {
            if let Some(red_secs) = self.red_duration_secs(timestamp) {
                if red_secs < FLICKER_SUPPRESS_SECS {
                    debug!(
                        "Ignoring RED→YELLOW flicker after only {:.1}s of red",
                        red_secs
                    );
                    return;
                }
            }
        }

        if let Some(prev) = self.last_change {
            let held_secs = (timestamp - prev).num_milliseconds() as f64 / 1000.0;
            debug!("Previous light state held for {held_secs:.1}s");
        }
        self.state = candidate;
        self.last_change = Some(timestamp);
        info!(
            "🚦 Traffic light: {} → {} (confidence {:.2})",
            old.as_str(),
            candidate.as_str(),
            self.confidence
        );

        if candidate == LightState::Red {
            if old == LightState::Yellow {
                if let Some(red_secs) = self.red_duration_secs(timestamp) {
                    if red_secs < RED_ANCHOR_REUSE_SECS {
                        debug!("Keeping existing red anchor (flicker recovery)");
                        return;
                    }
                }
            }
            self.red_start_time = Some(timestamp);
            self.red_start_frame = Some(frame_index);
            info!("🔴 Red light started at frame {}", frame_index);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
