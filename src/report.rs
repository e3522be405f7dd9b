use crate::{
    probe::{ProbeName, ProbeOutcome, ProbeValue},
    radio::{RadioCellRecord, format_mhz},
    session::Sample,
    util::rfc3339,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const NOT_CAPTURED: &str = "Not captured";
pub const FAILED: &str = "Failed or N/A";
pub const PENDING: &str = "Pending delivery";
const IN_PROGRESS: &str = "In progress";

/// Machine-readable session summary written next to the text report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started: String,
    pub finished: String,
    pub sample_count: usize,
    pub samples: Vec<Sample>,
}

impl SessionReport {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Session {}", self.session_id);
        let _ = writeln!(out, "Started:  {}", self.started);
        let _ = writeln!(out, "Finished: {}", self.finished);
        out.push_str(&format_session(&self.samples));
        out
    }
}

/// One-line-per-probe digest of a single sample.
pub fn format_live(sample: &Sample) -> String {
    let mut out = String::new();
    write_header(&mut out, sample);
    for probe in ProbeName::ALL {
        let _ = writeln!(out, "  {}: {}", probe.label(), outcome_text(sample.outcome(probe)));
    }
    out
}

/// Every sample in sequence order, with radio cell detail rows.
pub fn format_session(samples: &[Sample]) -> String {
    let mut ordered: Vec<&Sample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.sequence);

    let mut out = String::new();
    let _ = writeln!(out, "Samples: {}", ordered.len());
    for sample in ordered {
        out.push('\n');
        write_header(&mut out, sample);
        for probe in ProbeName::ALL {
            let outcome = sample.outcome(probe);
            let _ = writeln!(out, "  {}: {}", probe.label(), outcome_text(outcome));
            if let Some(ProbeOutcome::Success(ProbeValue::Cell(cell))) = outcome {
                write_cell_detail(&mut out, cell);
            }
        }
    }
    out
}

fn write_header(out: &mut String, sample: &Sample) {
    let _ = writeln!(out, "#{} {}", sample.sequence, rfc3339(sample.timestamp));
}

fn outcome_text(outcome: Option<&ProbeOutcome>) -> String {
    match outcome {
        None => IN_PROGRESS.to_string(),
        Some(ProbeOutcome::Disabled) => NOT_CAPTURED.to_string(),
        Some(ProbeOutcome::Failure(reason)) => format!("{FAILED} ({reason})"),
        Some(ProbeOutcome::Pending(id)) => format!("{PENDING} ({id})"),
        Some(ProbeOutcome::Success(value)) => value.to_string(),
    }
}

fn write_cell_detail(out: &mut String, cell: &RadioCellRecord) {
    let _ = writeln!(out, "    Technology: {}", cell.technology_label());
    if let RadioCellRecord::Unsupported { .. } = cell {
        return;
    }
    let _ = writeln!(out, "    Band: {}", cell.band().unwrap_or("unavailable"));
    let freq = cell
        .frequency_hz()
        .map(format_mhz)
        .unwrap_or_else(|| "unavailable".to_string());
    let _ = writeln!(out, "    Frequency: {freq}");
    for (name, value) in cell.detail_fields() {
        let _ = writeln!(out, "    {name}: {value}");
    }
}
