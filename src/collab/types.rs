use crate::probe::ProbeFailure;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Stdin payload for measurement, location and cell programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureRequest {
    pub probe: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub correlation_id: String,
    pub payload: String,
}

/// Stdout envelope every collaborator program answers with: exactly one of
/// `value`, `unavailable` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply<T> {
    pub value: Option<T>,
    #[serde(default)]
    pub unavailable: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> CommandReply<T> {
    pub fn into_result(self, what: &str) -> Result<T> {
        if let Some(reason) = self.unavailable {
            return Err(ProbeFailure::Unavailable(reason).into());
        }
        if let Some(err) = self.error {
            return Err(ProbeFailure::Transport(err).into());
        }
        self.value
            .ok_or_else(|| anyhow!("{what}: reply carried neither value nor error"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReply {
    /// Transports that mint their own ids return it here; otherwise the id
    /// from the request stands.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOut {
    pub kbps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyOut {
    pub millis: f64,
}
