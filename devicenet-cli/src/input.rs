//! Capture files
//!
//! Captures are stored as JSON: sample rate, initial level, transition
//! samples and total length, optionally with the wall-clock start time.

use anyhow::{Context, Result};
use devicenet_decoder::Capture;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Read and validate a capture file
pub fn load_capture(path: &Path) -> Result<Capture> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture file: {:?}", path))?;

    let capture: Capture = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse capture file: {:?}", path))?;

    capture
        .validate()
        .with_context(|| format!("Invalid capture file: {:?}", path))?;

    log::debug!(
        "Loaded {:?}: {} samples at {} Hz, {} transitions",
        path,
        capture.length,
        capture.sample_rate_hz,
        capture.transitions.len()
    );
    Ok(capture)
}

/// Write a capture file
pub fn save_capture(path: &Path, capture: &Capture) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create capture file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, capture)
        .with_context(|| format!("Failed to write capture file: {:?}", path))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write capture file: {:?}", path))?;
    log::info!("Saved capture to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use devicenet_decoder::BitState;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.json");

        let mut capture = Capture::new(4_000_000, BitState::High)
            .with_start_time(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        capture.transitions = vec![80, 88, 120];
        capture.length = 400;

        save_capture(&path, &capture).unwrap();
        let loaded = load_capture(&path).unwrap();
        assert_eq!(loaded, capture);
    }

    #[test]
    fn test_rejects_unsorted_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"sample_rate_hz":1000000,"initial_state":"high","transitions":[10,5],"length":20}"#,
        )
        .unwrap();

        let err = load_capture(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid capture file"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        fs::write(&path, "not json").unwrap();

        let err = load_capture(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse capture file"));
    }
}
