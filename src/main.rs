// src/main.rs

mod config;
mod decision;
mod evidence;
mod lane_filter;
mod light_tracker;
mod replay;
mod stop_line;
mod tracker;
mod types;
mod vehicle_state;
mod violation;
mod violation_detector;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracker::IouTracker;
use types::{Config, Frame};
use violation::Violation;
use violation_detector::ViolationDetector;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("redlight_detection={}", config.logging.level))
        .init();

    info!("🚦 Red Light Violation Detection System Starting");
    info!("✓ Configuration loaded from {config_path}");
    info!(
        "Detection thresholds: grace={:.1}s, min_frames={}, line_threshold={:.0}px",
        config.detector.grace_period_secs,
        config.detector.min_frames,
        config.detector.stop_line_threshold
    );

    let input_files = replay::find_input_files(&config.replay.input_dir)?;
    if input_files.is_empty() {
        error!("No detection files found in {}", config.replay.input_dir);
        return Ok(());
    }
    info!("Found {} detection file(s) to process", input_files.len());

    std::fs::create_dir_all(&config.replay.output_dir)
        .with_context(|| format!("creating output dir {}", config.replay.output_dir))?;

    for (idx, input_path) in input_files.iter().enumerate() {
        info!("\n========================================");
        info!(
            "Processing file {}/{}: {}",
            idx + 1,
            input_files.len(),
            input_path.display()
        );
        info!("========================================\n");

        match process_session(input_path, &config) {
            Ok(stats) => {
                info!("\n✓ Session processed successfully!");
                info!("  Total frames: {}", stats.total_frames);
                info!("  🔢 Unique vehicles tracked: {}", stats.unique_vehicles);
                if stats.violations > 0 {
                    warn!("  🚨 VIOLATIONS: {}", stats.violations);
                    for (class, count) in &stats.violations_by_class {
                        warn!("     {class}: {count}");
                    }
                } else {
                    info!("  🚨 Violations: 0");
                }
                info!("  Processing Speed: {:.1} FPS", stats.avg_fps);
            }
            Err(e) => {
                error!("Failed to process {}: {e:#}", input_path.display());
            }
        }
    }

    Ok(())
}

struct SessionStats {
    total_frames: u64,
    unique_vehicles: u32,
    violations: usize,
    violations_by_class: Vec<(String, usize)>,
    avg_fps: f64,
}

fn process_session(input_path: &Path, config: &Config) -> Result<SessionStats> {
    use std::time::Instant;

    let start_time = Instant::now();
    let session_start: DateTime<Utc> = Utc::now();

    let records = replay::read_records(input_path)?;
    info!("Loaded {} frame record(s)", records.len());

    let mut detector =
        ViolationDetector::new(config.detector.clone(), config.location.clone())?;
    let mut tracker = IouTracker::new(config.tracking.clone());

    let session_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session");
    let jsonl_path =
        Path::new(&config.replay.output_dir).join(format!("{session_name}_violations.jsonl"));
    let mut results_file = std::fs::File::create(&jsonl_path)
        .with_context(|| format!("creating {}", jsonl_path.display()))?;
    info!("💾 Violations will be written to: {}", jsonl_path.display());

    let mut total_frames: u64 = 0;

    for record in &records {
        total_frames += 1;

        let frame = Frame {
            data: Vec::new(),
            width: record.width,
            height: record.height,
            timestamp_ms: record.timestamp_ms,
        };
        let timestamp = session_start + Duration::milliseconds(record.timestamp_ms as i64);

        let update = tracker.update(&record.detections, record.frame_number);
        for lost_id in &update.lost_ids {
            detector.forget_track(*lost_id);
        }

        let new_violations = detector.update(
            &update.vehicles,
            &record.detections,
            &frame,
            record.frame_number,
            timestamp,
        );

        for violation in new_violations {
            save_violation(&violation, config, session_name, &mut results_file)?;
        }

        if total_frames % 100 == 0 {
            info!(
                "Progress: {}/{} | Light: {} | Line: {} | Tracking: {} | Violations: {}",
                total_frames,
                records.len(),
                detector.current_light_state().as_str(),
                detector
                    .stop_line_y()
                    .map_or("?".to_string(), |y| format!("{y:.0}px")),
                tracker.active_count(),
                detector.violations().len()
            );
        }
    }

    let duration = start_time.elapsed();
    let avg_fps = total_frames as f64 / duration.as_secs_f64().max(1e-6);
    let stats = detector.statistics();

    info!("\n📊 Final Report:");
    info!("  Total Frames: {}", stats.frames_processed);
    info!("  Vehicles Considered: {}", stats.vehicles_considered);
    info!("  Final Light State: {}", stats.current_light_state.as_str());
    if stats.total_violations > 0 {
        warn!("  🚨 VIOLATIONS: {}", stats.total_violations);
    } else {
        info!("  🚨 Violations: 0");
    }
    info!("  Processing Speed: {:.1} FPS", avg_fps);

    let mut violations_by_class: Vec<(String, usize)> =
        stats.by_vehicle_class.into_iter().collect();
    violations_by_class.sort();

    Ok(SessionStats {
        total_frames,
        unique_vehicles: tracker.total_unique(),
        violations: stats.total_violations,
        violations_by_class,
        avg_fps,
    })
}

/// Write evidence images (when pixel data is present) and append the
/// violation record to the session JSONL file.
fn save_violation(
    violation: &Violation,
    config: &Config,
    session_name: &str,
    file: &mut std::fs::File,
) -> Result<()> {
    let mut record = violation.clone();

    for ev in &violation.evidence {
        let Some(jpeg) = evidence::encode_rgb_jpeg(&ev.frame) else {
            debug!(
                "Evidence frame {} has no pixel data, skipping image write",
                ev.frame_number
            );
            continue;
        };
        let image_path = Path::new(&config.replay.output_dir).join(format!(
            "{session_name}_{}_{}.jpg",
            violation.violation_id, ev.label
        ));
        std::fs::write(&image_path, jpeg)
            .with_context(|| format!("writing {}", image_path.display()))?;
        debug!("📸 Saved evidence image: {}", image_path.display());
        record.evidence_paths.push(image_path.display().to_string());
    }

    let json_line = serde_json::to_string(&record)?;
    writeln!(file, "{json_line}")?;
    file.flush()?;
    info!("💾 Violation {} saved to JSONL", violation.violation_id);
    Ok(())
}
