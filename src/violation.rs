// src/violation.rs

use crate::evidence::EvidenceFrame;
use crate::types::{LightState, ObjectClass};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A confirmed red-light violation. Immutable once created; only the
/// administrative fields at the bottom (`status`, `license_plate`,
/// `officer_note`, `evidence_paths`) are filled in by the external
/// reviewing/persistence process after the fact.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub violation_id: String,
    pub track_id: u32,
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,

    // Vehicle at the moment of confirmation
    pub vehicle_class: ObjectClass,
    pub vehicle_bbox: [f32; 4],
    pub vehicle_confidence: f32,

    // Light context
    pub light_state: LightState,
    pub red_light_duration_secs: f64,

    // Line context
    pub stop_line_y: f32,
    pub crossing_distance: f32,

    /// Frame/detection pairs selected around the event. Not serialized;
    /// the persistence collaborator turns these into image files.
    #[serde(skip)]
    pub evidence: Vec<EvidenceFrame>,
    pub evidence_paths: Vec<String>,

    // Site metadata, copied verbatim from configuration
    pub location: String,
    pub camera_id: String,

    // Administrative fields owned by the reviewing process
    pub status: String,
    pub license_plate: Option<String>,
    pub officer_note: String,
}

impl Violation {
    /// `VL_<date>_<time>_<track>` — unique in practice since a track id
    /// violates at most once and ids are not reused within a second.
    pub fn make_id(timestamp: DateTime<Utc>, track_id: u32) -> String {
        format!("VL_{}_{:04}", timestamp.format("%Y%m%d_%H%M%S"), track_id)
    }
}
