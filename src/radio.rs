use serde::{Deserialize, Serialize};

// Frequencies are computed in 100 kHz steps.
const TENTH_MHZ_HZ: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Gsm,
    Umts,
    Lte,
    Nr,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub band: Option<String>,
    pub frequency_hz: Option<u64>,
}

pub fn decode(tech: Technology, channel: u32, bands: &[u32]) -> Decoded {
    match tech {
        Technology::Gsm => Decoded {
            band: gsm_band(channel).map(str::to_string),
            frequency_hz: gsm_frequency_hz(channel),
        },
        Technology::Umts => Decoded {
            band: Some(umts_band(channel).to_string()),
            frequency_hz: umts_frequency_hz(channel),
        },
        Technology::Lte => Decoded {
            band: lte_band(channel, bands),
            frequency_hz: lte_frequency_hz(channel),
        },
        Technology::Nr => Decoded {
            band: nr_band(bands),
            frequency_hz: nr_frequency_hz(channel),
        },
        Technology::Other => Decoded::default(),
    }
}

pub fn gsm_band(arfcn: u32) -> Option<&'static str> {
    match arfcn {
        0..=124 => Some("GSM-900"),
        128..=251 => Some("GSM-850"),
        259..=293 => Some("GSM-450"),
        306..=340 => Some("GSM-480"),
        512..=885 => Some("DCS-1800"),
        955..=1023 => Some("E-GSM-900"),
        _ => None,
    }
}

pub fn gsm_frequency_hz(arfcn: u32) -> Option<u64> {
    let n = i64::from(arfcn);
    // (base in tenths of MHz, reference channel); 0.2 MHz channel raster.
    let (base, reference) = match gsm_band(arfcn)? {
        "GSM-900" | "E-GSM-900" => (9352, 975),
        "DCS-1800" => (18052, 512),
        "GSM-850" => (8692, 128),
        _ => return None,
    };
    tenths_to_hz(base + 2 * (n - reference))
}

pub fn umts_band(uarfcn: u32) -> &'static str {
    match uarfcn {
        10562..=10838 => "Band 1",
        9662..=9938 => "Band 2",
        1162..=1513 => "Band 3",
        1537..=1738 => "Band 4",
        4357..=4458 => "Band 5",
        _ => "unknown",
    }
}

/// Only band 1 has a formula (`n x 0.2 MHz`).
pub fn umts_frequency_hz(uarfcn: u32) -> Option<u64> {
    if umts_band(uarfcn) != "Band 1" {
        return None;
    }
    tenths_to_hz(2 * i64::from(uarfcn))
}

/// The first authoritative band reported by the modem wins over range inference.
pub fn lte_band(earfcn: u32, bands: &[u32]) -> Option<String> {
    if let Some(first) = bands.first() {
        return Some(format!("LTE Band {first}"));
    }
    let band = match earfcn {
        0..=599 => 1,
        1200..=1949 => 3,
        2750..=3449 => 7,
        6150..=6449 => 20,
        _ => return None,
    };
    Some(format!("LTE Band {band}"))
}

pub fn lte_frequency_hz(earfcn: u32) -> Option<u64> {
    match earfcn {
        1200..=1949 => tenths_to_hz(18050 + (i64::from(earfcn) - 1200)),
        _ => None,
    }
}

pub fn nr_band(bands: &[u32]) -> Option<String> {
    bands.first().map(|b| format!("n{b}"))
}

/// NR-ARFCN decoding is not supported; always `None`.
pub fn nr_frequency_hz(_nrarfcn: u32) -> Option<u64> {
    None
}

fn tenths_to_hz(tenths: i64) -> Option<u64> {
    u64::try_from(tenths * TENTH_MHZ_HZ).ok()
}

pub fn format_mhz(hz: u64) -> String {
    let tenths = hz / TENTH_MHZ_HZ as u64;
    format!("{}.{} MHz", tenths / 10, tenths % 10)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GsmCell {
    pub lac: Option<u32>,
    pub cid: Option<u32>,
    pub arfcn: Option<u32>,
    pub bsic: Option<u8>,
    pub rssi_dbm: Option<i32>,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub frequency_hz: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UmtsCell {
    pub lac: Option<u32>,
    pub cid: Option<u32>,
    pub uarfcn: Option<u32>,
    pub psc: Option<u16>,
    pub rscp_dbm: Option<i32>,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub frequency_hz: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LteCell {
    pub tac: Option<u32>,
    pub ci: Option<u32>,
    pub earfcn: Option<u32>,
    pub pci: Option<u16>,
    #[serde(default)]
    pub bands: Vec<u32>,
    pub rsrp_dbm: Option<i32>,
    pub rsrq_db: Option<i32>,
    pub rssnr_db: Option<i32>,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub frequency_hz: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NrCell {
    pub tac: Option<u32>,
    pub nci: Option<u64>,
    pub nrarfcn: Option<u32>,
    pub pci: Option<u16>,
    #[serde(default)]
    pub bands: Vec<u32>,
    pub ss_rsrp_dbm: Option<i32>,
    pub ss_rsrq_db: Option<i32>,
    pub ss_sinr_db: Option<i32>,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub frequency_hz: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "technology", rename_all = "lowercase")]
pub enum RadioCellRecord {
    Gsm(GsmCell),
    Umts(UmtsCell),
    Lte(LteCell),
    Nr(NrCell),
    Unsupported { reported: String },
}

impl RadioCellRecord {
    pub fn technology_label(&self) -> &str {
        match self {
            RadioCellRecord::Gsm(_) => "GSM",
            RadioCellRecord::Umts(_) => "UMTS",
            RadioCellRecord::Lte(_) => "LTE",
            RadioCellRecord::Nr(_) => "NR",
            RadioCellRecord::Unsupported { reported } => reported.as_str(),
        }
    }

    /// Fills `band`/`frequency_hz` from the channel number. Values a
    /// collaborator already supplied are overwritten; a missing channel
    /// leaves both absent.
    pub fn decoded(self) -> Self {
        match self {
            RadioCellRecord::Gsm(mut c) => {
                let d = c.arfcn.map(|n| decode(Technology::Gsm, n, &[]));
                (c.band, c.frequency_hz) = split(d);
                RadioCellRecord::Gsm(c)
            }
            RadioCellRecord::Umts(mut c) => {
                let d = c.uarfcn.map(|n| decode(Technology::Umts, n, &[]));
                (c.band, c.frequency_hz) = split(d);
                RadioCellRecord::Umts(c)
            }
            RadioCellRecord::Lte(mut c) => {
                let d = match c.earfcn {
                    Some(n) => decode(Technology::Lte, n, &c.bands),
                    None => Decoded {
                        band: lte_band(u32::MAX, &c.bands),
                        frequency_hz: None,
                    },
                };
                (c.band, c.frequency_hz) = (d.band, d.frequency_hz);
                RadioCellRecord::Lte(c)
            }
            RadioCellRecord::Nr(mut c) => {
                c.band = nr_band(&c.bands);
                c.frequency_hz = None;
                RadioCellRecord::Nr(c)
            }
            other @ RadioCellRecord::Unsupported { .. } => other,
        }
    }

    pub fn band(&self) -> Option<&str> {
        match self {
            RadioCellRecord::Gsm(c) => c.band.as_deref(),
            RadioCellRecord::Umts(c) => c.band.as_deref(),
            RadioCellRecord::Lte(c) => c.band.as_deref(),
            RadioCellRecord::Nr(c) => c.band.as_deref(),
            RadioCellRecord::Unsupported { .. } => None,
        }
    }

    pub fn frequency_hz(&self) -> Option<u64> {
        match self {
            RadioCellRecord::Gsm(c) => c.frequency_hz,
            RadioCellRecord::Umts(c) => c.frequency_hz,
            RadioCellRecord::Lte(c) => c.frequency_hz,
            RadioCellRecord::Nr(c) => c.frequency_hz,
            RadioCellRecord::Unsupported { .. } => None,
        }
    }

    pub fn detail_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |name: &'static str, v: Option<String>| {
            if let Some(v) = v {
                out.push((name, v));
            }
        };
        match self {
            RadioCellRecord::Gsm(c) => {
                push("LAC", c.lac.map(|v| v.to_string()));
                push("CID", c.cid.map(|v| v.to_string()));
                push("ARFCN", c.arfcn.map(|v| v.to_string()));
                push("BSIC", c.bsic.map(|v| v.to_string()));
                push("RSSI", c.rssi_dbm.map(|v| format!("{v} dBm")));
            }
            RadioCellRecord::Umts(c) => {
                push("LAC", c.lac.map(|v| v.to_string()));
                push("CID", c.cid.map(|v| v.to_string()));
                push("UARFCN", c.uarfcn.map(|v| v.to_string()));
                push("PSC", c.psc.map(|v| v.to_string()));
                push("RSCP", c.rscp_dbm.map(|v| format!("{v} dBm")));
            }
            RadioCellRecord::Lte(c) => {
                push("TAC", c.tac.map(|v| v.to_string()));
                push("CI", c.ci.map(|v| v.to_string()));
                push("EARFCN", c.earfcn.map(|v| v.to_string()));
                push("PCI", c.pci.map(|v| v.to_string()));
                push("RSRP", c.rsrp_dbm.map(|v| format!("{v} dBm")));
                push("RSRQ", c.rsrq_db.map(|v| format!("{v} dB")));
                push("RSSNR", c.rssnr_db.map(|v| format!("{v} dB")));
            }
            RadioCellRecord::Nr(c) => {
                push("TAC", c.tac.map(|v| v.to_string()));
                push("NCI", c.nci.map(|v| v.to_string()));
                push("NR-ARFCN", c.nrarfcn.map(|v| v.to_string()));
                push("PCI", c.pci.map(|v| v.to_string()));
                push("SS-RSRP", c.ss_rsrp_dbm.map(|v| format!("{v} dBm")));
                push("SS-RSRQ", c.ss_rsrq_db.map(|v| format!("{v} dB")));
                push("SS-SINR", c.ss_sinr_db.map(|v| format!("{v} dB")));
            }
            RadioCellRecord::Unsupported { .. } => {}
        }
        out
    }
}

fn split(d: Option<Decoded>) -> (Option<String>, Option<u64>) {
    match d {
        Some(d) => (d.band, d.frequency_hz),
        None => (None, None),
    }
}
