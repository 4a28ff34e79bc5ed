// src/evidence.rs
//
// Rolling frame buffer and evidence selection. Every frame that enters the
// detector is buffered with its detections; when a violation confirms, the
// frame ~1s earlier and the confirming frame itself become the evidence
// pair. Evidence is best-effort: a target frame that has already rolled
// out of the buffer is silently omitted.

use crate::types::{Detection, Frame};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// ~5 seconds of lookback at 30fps.
pub const FRAME_BUFFER_CAPACITY: usize = 150;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub frame: Frame,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

/// One frame attached to a violation, paired with the detections that were
/// current when it was captured so it can be annotated later.
#[derive(Debug, Clone)]
pub struct EvidenceFrame {
    pub label: &'static str,
    pub frame: Frame,
    pub frame_number: u64,
    pub detections: Vec<Detection>,
}

pub struct EvidenceBuffer {
    frames: VecDeque<BufferedFrame>,
    capacity: usize,
}

impl EvidenceBuffer {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(
        &mut self,
        frame: Frame,
        frame_number: u64,
        timestamp: DateTime<Utc>,
        detections: Vec<Detection>,
    ) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(BufferedFrame {
            frame,
            frame_number,
            timestamp,
            detections,
        });
    }

    /// Select the pre-violation frame (`confirm_frame - fps`, ~1s earlier)
    /// and the confirming frame itself.
    pub fn collect(&self, confirm_frame: u64, fps: u32) -> Vec<EvidenceFrame> {
        let targets = [
            (confirm_frame.saturating_sub(fps as u64), "pre"),
            (confirm_frame, "during"),
        ];

        let mut selected = Vec::with_capacity(targets.len());
        for (target, label) in targets {
            match self.frames.iter().find(|b| b.frame_number == target) {
                Some(buffered) => selected.push(EvidenceFrame {
                    label,
                    frame: buffered.frame.clone(),
                    frame_number: buffered.frame_number,
                    detections: buffered.detections.clone(),
                }),
                None => debug!("Evidence frame {target} ({label}) not in buffer, skipping"),
            }
        }
        selected
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Encode an RGB frame to JPEG bytes. Returns `None` for empty or
/// undersized pixel buffers so metadata-only replay degrades cleanly.
pub fn encode_rgb_jpeg(frame: &Frame) -> Option<Vec<u8>> {
    use image::{ImageBuffer, RgbImage};
    use std::io::Cursor;

    let expected_len = frame.width as usize * frame.height as usize * 3;
    if expected_len == 0 || frame.data.len() < expected_len {
        return None;
    }

    let img: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, frame.data[..expected_len].to_vec())?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    if img.write_with_encoder(encoder).is_ok() {
        Some(buf.into_inner())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn frame(n: u64) -> Frame {
        Frame {
            data: Vec::new(),
            width: 640,
            height: 480,
            timestamp_ms: n as f64 * 33.0,
        }
    }

    #[test]
    fn selects_pre_and_during_frames() {
        let mut buffer = EvidenceBuffer::new();
        for n in 0..100 {
            buffer.push(frame(n), n, ts(n as i64 * 33), Vec::new());
        }
        let evidence = buffer.collect(90, 30);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].label, "pre");
        assert_eq!(evidence[0].frame_number, 60);
        assert_eq!(evidence[1].label, "during");
        assert_eq!(evidence[1].frame_number, 90);
    }

    #[test]
    fn missing_pre_frame_is_silently_omitted() {
        let mut buffer = EvidenceBuffer::new();
        // Only recent frames buffered; frame 60 never existed.
        for n in 80..95 {
            buffer.push(frame(n), n, ts(n as i64 * 33), Vec::new());
        }
        let evidence = buffer.collect(90, 30);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].label, "during");
    }

    #[test]
    fn buffer_is_bounded() {
        let mut buffer = EvidenceBuffer::new();
        for n in 0..500 {
            buffer.push(frame(n), n, ts(n as i64 * 33), Vec::new());
        }
        assert_eq!(buffer.len(), FRAME_BUFFER_CAPACITY);
        // Oldest entries rolled out.
        assert!(buffer.collect(349, 30).is_empty());
    }

    #[test]
    fn encode_skips_empty_frames() {
        assert!(encode_rgb_jpeg(&frame(0)).is_none());

        let full = Frame {
            data: vec![128; 16 * 16 * 3],
            width: 16,
            height: 16,
            timestamp_ms: 0.0,
        };
        let jpeg = encode_rgb_jpeg(&full).unwrap();
        // JPEG magic bytes.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
