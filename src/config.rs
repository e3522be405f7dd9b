use crate::probe::ProbeName;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub probes: Probes,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub collaborators: Collaborators,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub interval_ms: u64,
    /// 0 = run until `duration_seconds` elapses or the process is stopped.
    pub max_cycles: u64,
    /// 0 = no wall-clock bound.
    pub duration_seconds: u64,
    /// How long stop waits for outstanding delivery confirmations before the
    /// report is generated.
    pub report_grace_seconds: u64,
}
impl Default for Session {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_cycles: 0,
            duration_seconds: 60,
            report_grace_seconds: 10,
        }
    }
}

impl Session {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Probes {
    pub location: bool,
    pub cell_info: bool,
    pub download: bool,
    pub ping: bool,
    pub dns: bool,
    pub upload: bool,
    pub message_round_trip: bool,
}
impl Default for Probes {
    fn default() -> Self {
        Self {
            location: true,
            cell_info: true,
            download: true,
            ping: true,
            dns: true,
            upload: true,
            message_round_trip: false,
        }
    }
}

impl Probes {
    pub fn all_disabled() -> Self {
        Self {
            location: false,
            cell_info: false,
            download: false,
            ping: false,
            dns: false,
            upload: false,
            message_round_trip: false,
        }
    }

    pub fn enabled(&self, probe: ProbeName) -> bool {
        match probe {
            ProbeName::Location => self.location,
            ProbeName::CellInfo => self.cell_info,
            ProbeName::Download => self.download,
            ProbeName::Ping => self.ping,
            ProbeName::Dns => self.dns,
            ProbeName::Upload => self.upload,
            ProbeName::MessageRoundTrip => self.message_round_trip,
        }
    }

    pub fn set(&mut self, probe: ProbeName, on: bool) {
        let slot = match probe {
            ProbeName::Location => &mut self.location,
            ProbeName::CellInfo => &mut self.cell_info,
            ProbeName::Download => &mut self.download,
            ProbeName::Ping => &mut self.ping,
            ProbeName::Dns => &mut self.dns,
            ProbeName::Upload => &mut self.upload,
            ProbeName::MessageRoundTrip => &mut self.message_round_trip,
        };
        *slot = on;
    }

    pub fn enabled_count(&self) -> usize {
        ProbeName::ALL.iter().filter(|p| self.enabled(**p)).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Fires on cycle 1 and then every Nth cycle.
    pub every_n_cycles: u64,
    pub expiry_seconds: u64,
    pub sweep_interval_ms: u64,
    pub payload: String,
}
impl Default for Message {
    fn default() -> Self {
        Self {
            every_n_cycles: 10,
            expiry_seconds: 120,
            sweep_interval_ms: 1_000,
            payload: "radiodiag round-trip probe".into(),
        }
    }
}

impl Message {
    pub fn fires_on(&self, sequence: u64) -> bool {
        let n = self.every_n_cycles.max(1);
        sequence >= 1 && (sequence - 1) % n == 0
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// External programs backing each probe. Empty argv = not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Collaborators {
    pub timeout_seconds: u64,
    pub env: std::collections::BTreeMap<String, String>,
    pub location: Vec<String>,
    pub cell: Vec<String>,
    pub download: Vec<String>,
    pub upload: Vec<String>,
    pub ping: Vec<String>,
    pub dns: Vec<String>,
    pub message_send: Vec<String>,
    /// Long-running program printing one JSON delivery event per line.
    pub message_watch: Vec<String>,
}
impl Default for Collaborators {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            env: Default::default(),
            location: Vec::new(),
            cell: Vec::new(),
            download: Vec::new(),
            upload: Vec::new(),
            ping: Vec::new(),
            dns: Vec::new(),
            message_send: Vec::new(),
            message_watch: Vec::new(),
        }
    }
}

impl Collaborators {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub out_dir: String,
    pub print_live: bool,
    pub write_report_text: bool,
    pub write_report_json: bool,
    pub report_text_filename: String,
    pub report_json_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            print_live: true,
            write_report_text: true,
            write_report_json: true,
            report_text_filename: "report.txt".into(),
            report_json_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_collaborator_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_collaborator_stderr: true,
            dump_effective_config: false,
        }
    }
}
