// src/config.rs

use crate::types::{Config, DetectorConfig};
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("parsing {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if self.tracking.iou_threshold <= 0.0 || self.tracking.iou_threshold >= 1.0 {
            bail!(
                "tracking.iou_threshold must be within (0, 1), got {}",
                self.tracking.iou_threshold
            );
        }
        Ok(())
    }
}

impl DetectorConfig {
    /// Misconfigured thresholds silently change enforcement outcomes, so
    /// every value is checked up front instead of at first use.
    pub fn validate(&self) -> Result<()> {
        let d = self;
        if d.grace_period_secs < 0.0 {
            bail!(
                "detector.grace_period_secs must be non-negative, got {}",
                d.grace_period_secs
            );
        }
        if d.min_frames == 0 {
            bail!("detector.min_frames must be at least 1");
        }
        if d.stop_line_threshold < 0.0 {
            bail!(
                "detector.stop_line_threshold must be non-negative, got {}",
                d.stop_line_threshold
            );
        }
        if !(0.0..=1.0).contains(&d.min_vehicle_confidence) {
            bail!(
                "detector.min_vehicle_confidence must be within [0, 1], got {}",
                d.min_vehicle_confidence
            );
        }
        if d.fps == 0 {
            bail!("detector.fps must be at least 1");
        }
        let roi = &d.roi;
        if roi.x_min > roi.x_max || roi.y_min > roi.y_max {
            bail!(
                "detector.roi band is inverted: x=[{}, {}], y=[{}, {}]",
                roi.x_min,
                roi.x_max,
                roi.y_min,
                roi.y_max
            );
        }
        for (name, v) in [
            ("x_min", roi.x_min),
            ("x_max", roi.x_max),
            ("y_min", roi.y_min),
            ("y_max", roi.y_max),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("detector.roi.{name} must be normalized to [0, 1], got {v}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::*;

    fn test_config() -> Config {
        Config {
            detector: DetectorConfig::default(),
            tracking: TrackingConfig::default(),
            replay: ReplayConfig {
                input_dir: "input".to_string(),
                output_dir: "output".to_string(),
            },
            location: LocationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn negative_grace_period_is_rejected() {
        let mut config = test_config();
        config.detector.grace_period_secs = -0.5;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("grace_period_secs"), "{err}");
    }

    #[test]
    fn zero_confirm_frames_is_rejected() {
        let mut config = test_config();
        config.detector.min_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_roi_band_is_rejected() {
        let mut config = test_config();
        config.detector.roi.x_min = 0.9;
        config.detector.roi.x_max = 0.2;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("inverted"), "{err}");
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let mut config = test_config();
        config.detector.min_vehicle_confidence = 1.2;
        assert!(config.validate().is_err());
    }
}
