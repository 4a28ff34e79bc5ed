// src/replay.rs
//
// Offline replay input: one JSONL file per recorded session, one frame
// record per line. Records carry detector output only; pixel data is
// optional and arrives separately when evidence rendering is wanted.

use crate::types::Detection;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Deserialize)]
pub struct FrameRecord {
    pub frame_number: u64,
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// All `.jsonl` files under `dir`, sorted by path for deterministic
/// processing order.
pub fn find_input_files(dir: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "jsonl"))
        .collect();
    files.sort();
    debug!("Found {} input file(s) under {dir}", files.len());
    Ok(files)
}

pub fn read_records(path: &Path) -> Result<Vec<FrameRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = serde_json::from_str(&line).with_context(|| {
            format!("parsing {} line {}", path.display(), line_number + 1)
        })?;
        records.push(record);
    }
    Ok(records)
}
