use crate::radio::RadioCellRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeName {
    Location,
    CellInfo,
    Download,
    Ping,
    Dns,
    Upload,
    MessageRoundTrip,
}

impl ProbeName {
    pub const ALL: [ProbeName; 7] = [
        ProbeName::Location,
        ProbeName::CellInfo,
        ProbeName::Download,
        ProbeName::Ping,
        ProbeName::Dns,
        ProbeName::Upload,
        ProbeName::MessageRoundTrip,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProbeName::Location => "Location",
            ProbeName::CellInfo => "Cell info",
            ProbeName::Download => "Download",
            ProbeName::Ping => "Ping",
            ProbeName::Dns => "DNS",
            ProbeName::Upload => "Upload",
            ProbeName::MessageRoundTrip => "Message round-trip",
        }
    }

    pub fn is_async(self) -> bool {
        matches!(self, ProbeName::MessageRoundTrip)
    }
}

impl fmt::Display for ProbeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeValue {
    Location(Location),
    Cell(RadioCellRecord),
    Throughput { kbps: f64 },
    Latency { millis: f64 },
    RoundTrip { millis: u64 },
    /// Message probe configured but throttled on this cycle.
    Skipped,
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeValue::Location(l) => write!(f, "{:.6}, {:.6}", l.latitude, l.longitude),
            ProbeValue::Cell(c) => {
                write!(f, "{}", c.technology_label())?;
                if let Some(band) = c.band() {
                    write!(f, " {band}")?;
                }
                Ok(())
            }
            ProbeValue::Throughput { kbps } => write!(f, "{kbps:.1} kbps"),
            ProbeValue::Latency { millis } => write!(f, "{millis:.1} ms"),
            ProbeValue::RoundTrip { millis } => write!(f, "delivered in {millis} ms"),
            ProbeValue::Skipped => f.write_str("Skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ProbeFailure {
    /// Precondition not met: no authorization, provider off, nothing configured.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("transport failure: {0}")]
    Transport(String),
    /// An async correlation expired without a completion event.
    #[error("timed out waiting for delivery confirmation")]
    Timeout,
}

impl ProbeFailure {
    /// Maps a collaborator error onto the taxonomy. A `ProbeFailure` anywhere in
    /// the chain wins; anything else is a transport failure.
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|e| e.downcast_ref::<ProbeFailure>().cloned())
            .unwrap_or_else(|| ProbeFailure::Transport(format!("{err:#}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Disabled,
    Success(ProbeValue),
    Failure(ProbeFailure),
    Pending(String),
}

impl ProbeOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, ProbeOutcome::Pending(_))
    }

    pub fn from_result(res: anyhow::Result<ProbeValue>) -> Self {
        match res {
            Ok(v) => ProbeOutcome::Success(v),
            Err(e) => ProbeOutcome::Failure(ProbeFailure::from_error(&e)),
        }
    }
}
