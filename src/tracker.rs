// src/tracker.rs
//
// Greedy IoU track association. Stands in for the external multi-object
// tracker when replaying raw detection files: good enough to hand the
// violation core stable track ids, not meant to survive occlusion or
// re-identification.

use crate::types::{Detection, TrackedVehicle, TrackingConfig};
use std::collections::HashMap;
use tracing::debug;

struct Track {
    vehicle: TrackedVehicle,
    last_seen_frame: u64,
}

/// Result of one tracker step: the vehicles visible this frame and the
/// track ids retired since the previous step.
pub struct TrackerUpdate {
    pub vehicles: Vec<TrackedVehicle>,
    pub lost_ids: Vec<u32>,
}

pub struct IouTracker {
    config: TrackingConfig,
    next_id: u32,
    tracks: HashMap<u32, Track>,
}

impl IouTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            next_id: 0,
            tracks: HashMap::new(),
        }
    }

    pub fn update(&mut self, detections: &[Detection], frame_number: u64) -> TrackerUpdate {
        let mut visible = Vec::new();

        for det in detections.iter().filter(|d| d.class.is_vehicle()) {
            let mut best_match: Option<(u32, f32)> = None;
            for (track_id, track) in &self.tracks {
                if track.vehicle.detection.class != det.class {
                    continue;
                }
                if track.last_seen_frame == frame_number {
                    continue; // already claimed by another detection
                }
                let iou = calculate_iou(&track.vehicle.detection.bbox, &det.bbox);
                if iou > self.config.iou_threshold
                    && best_match.map_or(true, |(_, best)| iou > best)
                {
                    best_match = Some((*track_id, iou));
                }
            }

            let track_id = match best_match {
                Some((track_id, _)) => {
                    if let Some(track) = self.tracks.get_mut(&track_id) {
                        track.vehicle.push_position(det.clone());
                        track.last_seen_frame = frame_number;
                    }
                    track_id
                }
                None => {
                    let track_id = self.next_id;
                    self.next_id += 1;
                    debug!(
                        "🆕 New track #{track_id} ({}) at frame {frame_number}",
                        det.class.as_str()
                    );
                    self.tracks.insert(
                        track_id,
                        Track {
                            vehicle: TrackedVehicle::new(track_id, det.clone()),
                            last_seen_frame: frame_number,
                        },
                    );
                    track_id
                }
            };
            if let Some(track) = self.tracks.get(&track_id) {
                visible.push(track.vehicle.clone());
            }
        }

        let max_lost = self.config.max_lost_frames;
        let mut lost_ids = Vec::new();
        self.tracks.retain(|id, track| {
            let keep = frame_number.saturating_sub(track.last_seen_frame) < max_lost;
            if !keep {
                lost_ids.push(*id);
            }
            keep
        });
        if !lost_ids.is_empty() {
            debug!("🗑️  Retired {} stale track(s)", lost_ids.len());
        }

        visible.sort_by_key(|v| v.track_id);
        TrackerUpdate {
            vehicles: visible,
            lost_ids,
        }
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn total_unique(&self) -> u32 {
        self.next_id
    }
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
