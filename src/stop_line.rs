// src/stop_line.rs
//
// Resolves the authoritative stop line for the current frame. The line has
// no persistent identity: it is recomputed every frame from whatever source
// is available, in priority order detection → manual → fallback.

use crate::types::{Detection, ObjectClass};
use tracing::info;

/// Where the fallback line sits when nothing better is known: 25% down the
/// frame, the typical stop-line region for an intersection camera.
const FALLBACK_HEIGHT_RATIO: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLineSource {
    Detected,
    Manual,
    Fallback,
}

impl StopLineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Manual => "manual",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StopLine {
    pub y: f32,
    pub source: StopLineSource,
}

pub struct StopLineModel {
    manual_y: Option<f32>,
    fallback_y: Option<f32>,
}

impl StopLineModel {
    pub fn new(manual_y: Option<f32>) -> Self {
        Self {
            manual_y,
            fallback_y: None,
        }
    }

    /// Operator-provided line position, e.g. from an initial setup pass.
    pub fn set_manual(&mut self, y: f32) {
        info!("📍 Stop line manually set at y={y}");
        self.manual_y = Some(y);
    }

    /// Resolve the line Y for this frame. Always succeeds: when neither a
    /// detection nor a manual position exists, a fallback at 25% of frame
    /// height is computed once, logged, and reused so the decision engine
    /// can still catch vehicles moving forward substantially.
    pub fn resolve(&mut self, detections: &[Detection], frame_height: u32) -> StopLine {
        let detected = detections
            .iter()
            .filter(|d| d.class == ObjectClass::StopLine)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(det) = detected {
            // Vertical midpoint of the box, not its top edge.
            return StopLine {
                y: (det.bbox[1] + det.bbox[3]) / 2.0,
                source: StopLineSource::Detected,
            };
        }

        if let Some(y) = self.manual_y {
            return StopLine {
                y,
                source: StopLineSource::Manual,
            };
        }

        let y = *self.fallback_y.get_or_insert_with(|| {
            let y = frame_height as f32 * FALLBACK_HEIGHT_RATIO;
            info!("📍 No stop line detected; using fallback at y={y}");
            y
        });
        StopLine {
            y,
            source: StopLineSource::Fallback,
        }
    }

    pub fn reset(&mut self) {
        self.fallback_y = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_line_det(y1: f32, y2: f32, confidence: f32) -> Detection {
        Detection {
            class: ObjectClass::StopLine,
            confidence,
            bbox: [0.0, y1, 640.0, y2],
        }
    }

    #[test]
    fn detection_wins_and_uses_box_midpoint() {
        let mut model = StopLineModel::new(Some(300.0));
        let line = model.resolve(&[stop_line_det(390.0, 410.0, 0.8)], 720);
        assert_eq!(line.source, StopLineSource::Detected);
        assert_eq!(line.y, 400.0);
    }

    #[test]
    fn highest_confidence_detection_is_preferred() {
        let mut model = StopLineModel::new(None);
        let line = model.resolve(
            &[stop_line_det(100.0, 120.0, 0.4), stop_line_det(390.0, 410.0, 0.9)],
            720,
        );
        assert_eq!(line.y, 400.0);
    }

    #[test]
    fn manual_position_used_without_detection() {
        let mut model = StopLineModel::new(Some(350.0));
        let line = model.resolve(&[], 720);
        assert_eq!(line.source, StopLineSource::Manual);
        assert_eq!(line.y, 350.0);
    }

    #[test]
    fn fallback_is_quarter_height_and_cached() {
        let mut model = StopLineModel::new(None);
        let line = model.resolve(&[], 720);
        assert_eq!(line.source, StopLineSource::Fallback);
        assert_eq!(line.y, 180.0);
        // Cached value survives even if later frames report another height.
        let line = model.resolve(&[], 1080);
        assert_eq!(line.y, 180.0);
    }

    #[test]
    fn reset_recomputes_fallback() {
        let mut model = StopLineModel::new(None);
        assert_eq!(model.resolve(&[], 720).y, 180.0);
        model.reset();
        assert_eq!(model.resolve(&[], 1080).y, 270.0);
    }
}
