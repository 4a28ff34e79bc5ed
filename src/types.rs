// src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many trajectory points to keep per tracked vehicle.
pub const TRAJECTORY_CAP: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detector: DetectorConfig,
    pub tracking: TrackingConfig,
    pub replay: ReplayConfig,
    pub location: LocationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Seconds after a red transition during which crossings are not penalized.
    pub grace_period_secs: f64,
    /// Consecutive qualifying frames required before a violation is confirmed.
    pub min_frames: u32,
    /// Pixels past the stop line before a vehicle counts as having crossed.
    pub stop_line_threshold: f32,
    /// Vehicles below this detection confidence are ignored.
    pub min_vehicle_confidence: f32,
    /// Frame rate assumed for evidence lookback (pre-frame = confirm - fps).
    pub fps: u32,
    /// Operator-provided stop line Y, used when no stop line is detected.
    #[serde(default)]
    pub manual_stop_line_y: Option<f32>,
    pub roi: RoiConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 1.5,
            min_frames: 3,
            stop_line_threshold: 10.0,
            min_vehicle_confidence: 0.5,
            fps: 30,
            manual_stop_line_y: None,
            roi: RoiConfig::default(),
        }
    }
}

/// Lane-of-interest band, normalized to [0, 1] frame coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiConfig {
    pub enabled: bool,
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            x_min: 0.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub iou_threshold: f32,
    /// Tracks unseen for this many frames are retired.
    pub max_lost_frames: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_lost_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationConfig {
    pub intersection: String,
    pub camera_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Raw frame image. Pixels are RGB8; `data` may be empty when the input
/// source carries no imagery (detection-only replay), in which case evidence
/// degrades to metadata only.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: f64,
}

/// The closed detection vocabulary of the upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Car,
    Motorbike,
    Bus,
    Truck,
    RedLight,
    YellowLight,
    GreenLight,
    StopLine,
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorbike => "motorbike",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::RedLight => "red_light",
            Self::YellowLight => "yellow_light",
            Self::GreenLight => "green_light",
            Self::StopLine => "stop_line",
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, Self::Car | Self::Motorbike | Self::Bus | Self::Truck)
    }

    pub fn is_light(&self) -> bool {
        matches!(self, Self::RedLight | Self::YellowLight | Self::GreenLight)
    }
}

/// Debounced traffic light color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightState {
    Red,
    Yellow,
    Green,
    Unknown,
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The state a light-class detection reports.
    pub fn from_class(class: ObjectClass) -> Option<Self> {
        match class {
            ObjectClass::RedLight => Some(Self::Red),
            ObjectClass::YellowLight => Some(Self::Yellow),
            ObjectClass::GreenLight => Some(Self::Green),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class: ObjectClass,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in pixel coordinates.
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }

    /// Bottom edge of the box — the point of the vehicle closest to the
    /// stop line in a forward-facing intersection camera.
    pub fn bottom_y(&self) -> f32 {
        self.bbox[3]
    }
}

/// A vehicle with a stable identity across frames, as produced by the
/// external tracker. The core only reads it.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub track_id: u32,
    pub detection: Detection,
    /// Recent center positions, oldest first, capped at [`TRAJECTORY_CAP`].
    pub trajectory: VecDeque<(f32, f32)>,
}

impl TrackedVehicle {
    pub fn new(track_id: u32, detection: Detection) -> Self {
        let mut trajectory = VecDeque::with_capacity(TRAJECTORY_CAP);
        trajectory.push_back(detection.center());
        Self {
            track_id,
            detection,
            trajectory,
        }
    }

    pub fn push_position(&mut self, detection: Detection) {
        self.trajectory.push_back(detection.center());
        if self.trajectory.len() > TRAJECTORY_CAP {
            self.trajectory.pop_front();
        }
        self.detection = detection;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_is_bounded() {
        let det = Detection {
            class: ObjectClass::Car,
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
        };
        let mut vehicle = TrackedVehicle::new(7, det.clone());
        for i in 0..100 {
            let mut d = det.clone();
            d.bbox[3] = 10.0 + i as f32;
            vehicle.push_position(d);
        }
        assert_eq!(vehicle.trajectory.len(), TRAJECTORY_CAP);
        assert_eq!(vehicle.detection.bbox[3], 109.0);
    }

    #[test]
    fn class_predicates() {
        assert!(ObjectClass::Car.is_vehicle());
        assert!(ObjectClass::Motorbike.is_vehicle());
        assert!(!ObjectClass::RedLight.is_vehicle());
        assert!(ObjectClass::RedLight.is_light());
        assert!(!ObjectClass::StopLine.is_light());
        assert_eq!(
            LightState::from_class(ObjectClass::YellowLight),
            Some(LightState::Yellow)
        );
        assert_eq!(LightState::from_class(ObjectClass::StopLine), None);
    }
}
