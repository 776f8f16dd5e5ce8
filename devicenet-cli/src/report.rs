//! Report generation
//!
//! Text reports list every committed frame with its field records, sample
//! spans, DeviceNet classification and flags. JSON reports serialise the
//! same data for other tools.

use crate::config::OutputFormat;
use devicenet_decoder::{
    AnalyzerStats, Capture, DecodedFrame, DeviceNetIdentifier, FieldKind, FieldRecord,
    FrameStatus, Timestamp,
};
use serde::Serialize;
use std::io::{self, Write};

/// A committed frame with its position in time
#[derive(Debug, Clone, Serialize)]
pub struct FrameEntry {
    /// Earliest annotated sample
    pub sample: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(flatten)]
    pub frame: DecodedFrame,
}

/// Decode results for one capture
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub source: String,
    pub sample_rate_hz: u32,
    pub stats: AnalyzerStats,
    pub frames: Vec<FrameEntry>,
}

impl CaptureReport {
    pub fn new(source: String, capture: &Capture, stats: AnalyzerStats, frames: Vec<DecodedFrame>) -> Self {
        let frames = frames
            .into_iter()
            .map(|frame| {
                let sample = frame.first_sample();
                FrameEntry {
                    sample,
                    timestamp: sample.and_then(|s| capture.timestamp_of(s)),
                    frame,
                }
            })
            .collect();

        Self {
            source,
            sample_rate_hz: capture.sample_rate_hz,
            stats,
            frames,
        }
    }
}

/// Write reports in the requested format
pub fn write_reports<W: Write>(out: &mut W, format: OutputFormat, reports: &[CaptureReport]) -> io::Result<()> {
    match format {
        OutputFormat::Txt => write_text(out, reports),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, reports)?;
            writeln!(out)
        }
    }
}

fn write_text<W: Write>(out: &mut W, reports: &[CaptureReport]) -> io::Result<()> {
    for report in reports {
        writeln!(out, "═══════════════════════════════════════════════")?;
        writeln!(out, "  {} ({} Hz)", report.source, report.sample_rate_hz)?;
        writeln!(out, "═══════════════════════════════════════════════")?;

        for (index, entry) in report.frames.iter().enumerate() {
            write_frame(out, index, report.sample_rate_hz, entry)?;
        }

        let stats = &report.stats;
        writeln!(out, "───────────────────────────────────────────────")?;
        writeln!(
            out,
            "Frames: {} ({} complete, {} stuff errors, {} CRC mismatches, {} abandoned)",
            stats.frames_committed,
            stats.complete_frames,
            stats.stuff_errors,
            stats.crc_mismatches,
            stats.abandoned
        )?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_frame<W: Write>(out: &mut W, index: usize, sample_rate_hz: u32, entry: &FrameEntry) -> io::Result<()> {
    let status = match entry.frame.status {
        FrameStatus::Complete => "complete".to_string(),
        FrameStatus::Exhausted => "incomplete".to_string(),
        FrameStatus::StuffError {
            start_sample,
            end_sample,
        } => format!("stuff error at samples {}..{}", start_sample, end_sample),
    };

    write!(out, "Frame {}", index + 1)?;
    if let Some(sample) = entry.sample {
        let seconds = sample as f64 / f64::from(sample_rate_hz);
        write!(out, " @ sample {} ({:.6} s)", sample, seconds)?;
    }
    if let Some(timestamp) = entry.timestamp {
        write!(out, " {}", timestamp.format("%Y-%m-%d %H:%M:%S%.6f"))?;
    }
    writeln!(out, " [{}]", status)?;

    for record in &entry.frame.records {
        writeln!(out, "  {}", describe(record))?;
    }
    Ok(())
}

fn describe(record: &FieldRecord) -> String {
    let value = match record.kind {
        FieldKind::Identifier => {
            let id = DeviceNetIdentifier::classify(record.value as u32);
            format!("0x{:03X}  {}", record.value, id)
        }
        FieldKind::IdentifierExtended => format!("0x{:08X}", record.value),
        FieldKind::Control => format!("DLC {}", record.value),
        FieldKind::Data => format!("0x{:02X}", record.value),
        FieldKind::Crc => format!("0x{:04X}", record.value),
        FieldKind::Ack => if record.value != 0 { "ACK" } else { "NAK" }.to_string(),
    };

    let mut line = format!(
        "{:<20} {:>10}..{:<10} {}",
        record.kind.to_string(),
        record.start_sample,
        record.end_sample,
        value
    );
    let flags = record.flags.names();
    if !flags.is_empty() {
        line.push_str(&format!("  [{}]", flags.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicenet_decoder::simulation::SimulationDataGenerator;
    use devicenet_decoder::{Analyzer, DecoderConfig, FrameCollector, StopSignal};

    fn simulated_report(error_every: u64) -> CaptureReport {
        let config = DecoderConfig::new();
        let mut generator = SimulationDataGenerator::new(config.clone(), 4_000_000)
            .unwrap()
            .with_error_every(error_every);
        generator.generate_frames(3).unwrap();
        let capture = generator.capture();

        let analyzer = Analyzer::new(config, capture.sample_rate_hz).unwrap();
        let mut collector = FrameCollector::new();
        let stats = analyzer
            .run(&mut capture.cursor(), &mut collector, &StopSignal::new())
            .unwrap();
        CaptureReport::new("simulation".to_string(), &capture, stats, collector.into_frames())
    }

    #[test]
    fn test_text_report() {
        let report = simulated_report(3);
        let mut out = Vec::new();
        write_reports(&mut out, OutputFormat::Txt, &[report]).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("simulation (4000000 Hz)"));
        assert!(text.contains("Frame 1 @ sample"));
        assert!(text.contains("Group 1 msg 0xC src MAC 47"));
        assert!(text.contains("DLC 8"));
        assert!(text.contains("ACK"));
        assert!(text.contains("NAK"));
        assert!(text.contains("stuff error at samples"));
        assert!(text.contains("Frames: 3 (2 complete, 1 stuff errors"));
    }

    #[test]
    fn test_json_report() {
        let report = simulated_report(0);
        let mut out = Vec::new();
        write_reports(&mut out, OutputFormat::Json, &[report]).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let frames = value[0]["frames"].as_array().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["status"]["kind"], "complete");
        assert_eq!(frames[0]["records"][0]["value"], 0x32F);
        assert_eq!(value[0]["stats"]["frames_committed"], 3);
    }

    #[test]
    fn test_describe_flags() {
        let record = FieldRecord::new(FieldKind::Identifier, 10, 20, 0x7F3).with_flags(
            devicenet_decoder::FieldFlags {
                invalid_can_identifier: true,
                ..Default::default()
            },
        );
        let line = describe(&record);
        assert!(line.contains("0x7F3"));
        assert!(line.contains("[invalid-can-identifier]"));
    }
}
