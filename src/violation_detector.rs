// src/violation_detector.rs
//
// Orchestrates one monitored stream: light voting, stop-line resolution,
// lane gating, per-vehicle state and the violation decision, frame by
// frame. All mutable state lives on this instance — one detector per
// camera stream, reset between sessions, nothing shared.

use crate::decision;
use crate::evidence::EvidenceBuffer;
use crate::lane_filter::LaneFilter;
use crate::light_tracker::TrafficLightTracker;
use crate::stop_line::{StopLine, StopLineModel};
use crate::types::{Detection, DetectorConfig, Frame, LightState, LocationConfig, TrackedVehicle};
use crate::vehicle_state::VehicleStateStore;
use crate::violation::Violation;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Cumulative session statistics, exposed for display and reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectorStats {
    pub total_violations: usize,
    pub by_vehicle_class: HashMap<String, usize>,
    pub current_light_state: LightState,
    pub frames_processed: u64,
    pub vehicles_considered: u64,
}

pub struct ViolationDetector {
    config: DetectorConfig,
    location: LocationConfig,

    lights: TrafficLightTracker,
    stop_line: StopLineModel,
    lane_filter: LaneFilter,
    states: VehicleStateStore,
    evidence: EvidenceBuffer,

    /// Confirmed violations keyed by track id — the dedup set guaranteeing
    /// at most one violation per track per session.
    violations: HashMap<u32, Violation>,
    last_stop_line: Option<StopLine>,

    frames_processed: u64,
    vehicles_considered: u64,
}

impl ViolationDetector {
    /// Fails eagerly on invalid thresholds; a misconfigured detector must
    /// never run.
    pub fn new(config: DetectorConfig, location: LocationConfig) -> Result<Self> {
        config.validate()?;

        info!("✅ ViolationDetector initialized");
        info!("   - Grace period: {}s", config.grace_period_secs);
        info!("   - Min frames: {}", config.min_frames);
        info!("   - Stop line threshold: {}px", config.stop_line_threshold);
        if config.roi.enabled {
            info!(
                "   - Lane band: x=[{:.2}-{:.2}], y=[{:.2}-{:.2}]",
                config.roi.x_min, config.roi.x_max, config.roi.y_min, config.roi.y_max
            );
        }

        Ok(Self {
            stop_line: StopLineModel::new(config.manual_stop_line_y),
            lane_filter: LaneFilter::new(config.roi.clone()),
            config,
            location,
            lights: TrafficLightTracker::new(),
            states: VehicleStateStore::new(),
            evidence: EvidenceBuffer::new(),
            violations: HashMap::new(),
            last_stop_line: None,
            frames_processed: 0,
            vehicles_considered: 0,
        })
    }

    /// Main entry point, called once per frame in strict frame order.
    /// Returns the violations newly confirmed this frame (usually empty).
    pub fn update(
        &mut self,
        tracked_vehicles: &[TrackedVehicle],
        detections: &[Detection],
        frame: &Frame,
        frame_number: u64,
        timestamp: DateTime<Utc>,
    ) -> Vec<Violation> {
        self.frames_processed += 1;
        let mut new_violations = Vec::new();

        self.evidence
            .push(frame.clone(), frame_number, timestamp, detections.to_vec());

        self.lights
            .observe(detections, frame.width, timestamp, frame_number);

        let stop_line = self.stop_line.resolve(detections, frame.height);
        if self.last_stop_line.map(|l| l.source) != Some(stop_line.source) {
            debug!(
                "📍 Stop line from {} source at y={:.0}",
                stop_line.source.as_str(),
                stop_line.y
            );
        }
        self.last_stop_line = Some(stop_line);

        // No established light belief yet: nothing to enforce against.
        if self.lights.state() == LightState::Unknown {
            debug!("No traffic light belief yet, skipping frame {frame_number}");
            return new_violations;
        }

        // Light transitions drive the state store. On the exact red-start
        // frame every visible vehicle gets its before/after-line baseline;
        // on green the waiting set is cleared wholesale.
        if self.lights.red_started_at(frame_number) {
            self.states.snapshot_red_start(tracked_vehicles, stop_line.y);
        } else if self.lights.state() == LightState::Green && !self.states.is_empty() {
            debug!("🟢 Green light - clearing vehicle states");
            self.states.clear_all();
        }

        for vehicle in tracked_vehicles {
            if !vehicle.detection.class.is_vehicle() {
                continue;
            }
            if vehicle.detection.confidence < self.config.min_vehicle_confidence {
                continue;
            }
            if !self.lane_filter.is_relevant(
                vehicle,
                frame.width,
                frame.height,
                self.lights.red_light_center_x(),
            ) {
                continue;
            }
            self.vehicles_considered += 1;

            let bottom_y = vehicle.detection.bottom_y();
            let center_x = vehicle.detection.center().0;
            let state = self.states.get_or_create(
                vehicle.track_id,
                bottom_y,
                stop_line.y,
                self.lights.state(),
            );
            state.update_position(bottom_y, center_x);

            // Dedup: a track that already produced a violation is done.
            if self.violations.contains_key(&vehicle.track_id) {
                continue;
            }

            let Some(crossing) = decision::evaluate(
                vehicle,
                state,
                &self.lights,
                stop_line.y,
                &self.config,
                frame_number,
                timestamp,
            ) else {
                continue;
            };

            let violation = Violation {
                violation_id: Violation::make_id(timestamp, vehicle.track_id),
                track_id: vehicle.track_id,
                timestamp,
                frame_number,
                vehicle_class: vehicle.detection.class,
                vehicle_bbox: vehicle.detection.bbox,
                vehicle_confidence: vehicle.detection.confidence,
                light_state: LightState::Red,
                red_light_duration_secs: crossing.red_duration_secs,
                stop_line_y: stop_line.y,
                crossing_distance: crossing.crossing_distance,
                evidence: self.evidence.collect(frame_number, self.config.fps),
                evidence_paths: Vec::new(),
                location: self.location.intersection.clone(),
                camera_id: self.location.camera_id.clone(),
                status: "pending".to_string(),
                license_plate: None,
                officer_note: String::new(),
            };

            warn!(
                "🚨 VIOLATION: {} — {} (track {}) crossed {:.0}px past the line after {:.1}s of red",
                violation.violation_id,
                violation.vehicle_class.as_str(),
                vehicle.track_id,
                violation.crossing_distance,
                violation.red_light_duration_secs
            );

            self.violations.insert(vehicle.track_id, violation.clone());
            new_violations.push(violation);
        }

        new_violations
    }

    /// The tracker retired this id; its in-progress state is dropped.
    /// Confirmed violations are kept — confirmations are final.
    pub fn forget_track(&mut self, track_id: u32) {
        self.states.evict(track_id);
    }

    /// Operator-provided stop line position.
    pub fn set_stop_line_manual(&mut self, y: f32) {
        self.stop_line.set_manual(y);
    }

    pub fn current_light_state(&self) -> LightState {
        self.lights.state()
    }

    pub fn stop_line_y(&self) -> Option<f32> {
        self.last_stop_line.map(|l| l.y)
    }

    pub fn violations(&self) -> &HashMap<u32, Violation> {
        &self.violations
    }

    pub fn statistics(&self) -> DetectorStats {
        let mut by_vehicle_class: HashMap<String, usize> = HashMap::new();
        for violation in self.violations.values() {
            *by_vehicle_class
                .entry(violation.vehicle_class.as_str().to_string())
                .or_insert(0) += 1;
        }
        DetectorStats {
            total_violations: self.violations.len(),
            by_vehicle_class,
            current_light_state: self.lights.state(),
            frames_processed: self.frames_processed,
            vehicles_considered: self.vehicles_considered,
        }
    }

    /// Atomically clears all mutable state for a new session. Must not be
    /// interleaved with `update` on the same instance.
    pub fn reset(&mut self) {
        self.lights.reset();
        self.stop_line.reset();
        self.states.clear_all();
        self.violations.clear();
        self.evidence.clear();
        self.last_stop_line = None;
        self.frames_processed = 0;
        self.vehicles_considered = 0;
        info!("🔄 ViolationDetector reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectClass;
    use chrono::TimeZone;

    const FRAME_MS: i64 = 33;
    const LINE_Y: f32 = 400.0;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn frame() -> Frame {
        Frame {
            data: Vec::new(),
            width: 1280,
            height: 720,
            timestamp_ms: 0.0,
        }
    }

    fn light_det(class: ObjectClass) -> Detection {
        Detection {
            class,
            confidence: 0.9,
            bbox: [900.0, 50.0, 940.0, 130.0],
        }
    }

    fn stop_line_det() -> Detection {
        Detection {
            class: ObjectClass::StopLine,
            confidence: 0.8,
            bbox: [0.0, LINE_Y - 10.0, 1280.0, LINE_Y + 10.0],
        }
    }

    fn car(track_id: u32, bottom_y: f32) -> TrackedVehicle {
        TrackedVehicle::new(
            track_id,
            Detection {
                class: ObjectClass::Car,
                confidence: 0.9,
                bbox: [500.0, bottom_y - 80.0, 620.0, bottom_y],
            },
        )
    }

    fn detector() -> ViolationDetector {
        ViolationDetector::new(DetectorConfig::default(), LocationConfig::default()).unwrap()
    }

    /// Drives one frame with a light detection, the stop line, and the
    /// given vehicles.
    fn step(
        detector: &mut ViolationDetector,
        light: ObjectClass,
        vehicles: &[TrackedVehicle],
        frame_number: u64,
    ) -> Vec<Violation> {
        let detections = vec![light_det(light), stop_line_det()];
        detector.update(
            vehicles,
            &detections,
            &frame(),
            frame_number,
            ts(frame_number as i64 * FRAME_MS),
        )
    }

    fn run_scenario_a(detector: &mut ViolationDetector) -> Vec<Violation> {
        let mut all = Vec::new();
        // Red established early; vehicle waits before the line for 100
        // frames (~3.3s, past the 1.5s grace period).
        for f in 0..100 {
            all.extend(step(detector, ObjectClass::RedLight, &[car(1, 370.0)], f));
        }
        // Then it rolls across the line.
        for (i, y) in [370.0, 390.0, 410.0, 430.0, 450.0, 450.0, 450.0, 450.0]
            .iter()
            .enumerate()
        {
            all.extend(step(
                detector,
                ObjectClass::RedLight,
                &[car(1, *y)],
                100 + i as u64,
            ));
        }
        all
    }

    #[test]
    fn scenario_a_waiting_then_crossing_yields_one_violation() {
        let mut detector = detector();
        let violations = run_scenario_a(&mut detector);
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.track_id, 1);
        assert!((v.crossing_distance - 50.0).abs() < 1e-3);
        assert_eq!(v.light_state, LightState::Red);
        assert_eq!(v.stop_line_y, LINE_Y);
        assert_eq!(detector.statistics().total_violations, 1);
    }

    #[test]
    fn scenario_b_vehicle_already_past_line_is_never_flagged() {
        let mut detector = detector();
        let mut all = Vec::new();
        // Vehicle is at y=450 (past the line) when red is established.
        for f in 0..100 {
            all.extend(step(&mut detector, ObjectClass::RedLight, &[car(1, 450.0)], f));
        }
        // It keeps moving forward to y=500.
        for f in 100..130 {
            let y = 450.0 + (f - 100) as f32 * 2.0;
            all.extend(step(&mut detector, ObjectClass::RedLight, &[car(1, y)], f));
        }
        assert!(all.is_empty());
    }

    #[test]
    fn scenario_c_crossing_within_grace_period_is_not_flagged() {
        let mut detector = detector();
        let mut all = Vec::new();
        // Red established around frame 4 (~0.13s); the vehicle crosses
        // completely by frame 15 (~0.5s), inside the 1.5s grace period,
        // then leaves the tracker's view.
        for f in 0..5 {
            all.extend(step(&mut detector, ObjectClass::RedLight, &[car(1, 390.0)], f));
        }
        for f in 5..15 {
            let y = 390.0 + (f - 5) as f32 * 6.0;
            all.extend(step(&mut detector, ObjectClass::RedLight, &[car(1, y)], f));
        }
        for f in 15..30 {
            all.extend(step(&mut detector, ObjectClass::RedLight, &[], f));
        }
        assert!(all.is_empty());
    }

    #[test]
    fn at_most_one_violation_per_track() {
        let mut detector = detector();
        let violations = run_scenario_a(&mut detector);
        assert_eq!(violations.len(), 1);
        // Keep feeding the same crossed vehicle for a long time.
        let mut later = Vec::new();
        for f in 110..300 {
            later.extend(step(&mut detector, ObjectClass::RedLight, &[car(1, 460.0)], f));
        }
        assert!(later.is_empty());
        assert_eq!(detector.statistics().total_violations, 1);
    }

    #[test]
    fn no_violation_when_light_never_red() {
        let mut detector = detector();
        let mut all = Vec::new();
        for f in 0..200 {
            let y = 300.0 + f as f32; // moves straight through the line
            all.extend(step(&mut detector, ObjectClass::GreenLight, &[car(1, y)], f));
        }
        assert!(all.is_empty());
        assert_eq!(detector.current_light_state(), LightState::Green);
    }

    #[test]
    fn reset_restores_determinism() {
        let mut detector = detector();
        let first = run_scenario_a(&mut detector);
        detector.reset();
        assert_eq!(detector.statistics().total_violations, 0);
        assert_eq!(detector.current_light_state(), LightState::Unknown);
        let second = run_scenario_a(&mut detector);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].violation_id, second[0].violation_id);
        assert_eq!(first[0].frame_number, second[0].frame_number);
        assert_eq!(first[0].crossing_distance, second[0].crossing_distance);
    }

    #[test]
    fn evidence_attached_to_confirmed_violation() {
        let mut detector = detector();
        let violations = run_scenario_a(&mut detector);
        let evidence = &violations[0].evidence;
        // Both targets are well inside the 150-frame buffer here.
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].label, "pre");
        assert_eq!(evidence[1].label, "during");
        assert_eq!(
            evidence[1].frame_number,
            violations[0].frame_number
        );
        assert!(!evidence[1].detections.is_empty());
    }

    #[test]
    fn low_confidence_vehicles_are_ignored() {
        let mut detector = detector();
        let mut all = Vec::new();
        for f in 0..150 {
            let mut v = car(1, 460.0);
            v.detection.confidence = 0.3;
            all.extend(step(&mut detector, ObjectClass::RedLight, &[v], f));
        }
        assert!(all.is_empty());
    }

    #[test]
    fn manual_stop_line_used_without_detection() {
        let mut detector = detector();
        detector.set_stop_line_manual(350.0);
        let detections = vec![light_det(ObjectClass::RedLight)];
        detector.update(&[], &detections, &frame(), 0, ts(0));
        assert_eq!(detector.stop_line_y(), Some(350.0));
    }

    #[test]
    fn statistics_count_by_class() {
        let mut detector = detector();
        run_scenario_a(&mut detector);
        let stats = detector.statistics();
        assert_eq!(stats.by_vehicle_class.get("car"), Some(&1));
        assert_eq!(stats.current_light_state, LightState::Red);
        assert!(stats.frames_processed >= 108);
    }
}
