// src/lane_filter.rs
//
// Lane-of-interest gating. A single intersection camera often frames two
// directions of traffic controlled by different signal phases; without this
// filter the engine would flag vehicles not governed by the observed light.

use crate::types::{RoiConfig, TrackedVehicle};

/// When the red light sits right of frame center, vehicles left of this
/// normalized X are oncoming traffic and are excluded.
const OPPOSITE_LANE_LEFT_EDGE: f32 = 0.25;
/// Symmetric bound for a red light left of center.
const OPPOSITE_LANE_RIGHT_EDGE: f32 = 0.75;

pub struct LaneFilter {
    roi: RoiConfig,
}

impl LaneFilter {
    pub fn new(roi: RoiConfig) -> Self {
        Self { roi }
    }

    /// Whether this vehicle is plausibly controlled by the observed light.
    /// `red_light_cx` is the remembered normalized center of the red light,
    /// when one has been seen.
    pub fn is_relevant(
        &self,
        vehicle: &TrackedVehicle,
        frame_width: u32,
        frame_height: u32,
        red_light_cx: Option<f32>,
    ) -> bool {
        if !self.roi.enabled {
            return true;
        }
        if frame_width == 0 || frame_height == 0 {
            return true;
        }

        let (cx, cy) = vehicle.detection.center();
        let cx = cx / frame_width as f32;
        let cy = cy / frame_height as f32;

        if !(self.roi.y_min..=self.roi.y_max).contains(&cy) {
            return false;
        }

        if let Some(light_cx) = red_light_cx {
            if light_cx > 0.5 {
                if cx < OPPOSITE_LANE_LEFT_EDGE {
                    return false;
                }
            } else if cx > OPPOSITE_LANE_RIGHT_EDGE {
                return false;
            }
        }

        (self.roi.x_min..=self.roi.x_max).contains(&cx)
    }
}
