#![allow(dead_code)]

use anyhow::Result;
use radiodiag::{
    collab::{CellSource, LocationSource, Measurement, MessageTransport, ProbeBackends},
    config::{Config, Probes},
    correlation::CorrelationTracker,
    orchestrator::SampleOrchestrator,
    probe::{Location, ProbeValue},
    radio::{LteCell, RadioCellRecord},
    session::SessionStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct Loc<F>(F);
impl<F: Fn() -> Result<Location> + Send + Sync> LocationSource for Loc<F> {
    fn read(&self) -> Result<Location> {
        (self.0)()
    }
}

struct Cell<F>(F);
impl<F: Fn() -> Result<RadioCellRecord> + Send + Sync> CellSource for Cell<F> {
    fn read(&self) -> Result<RadioCellRecord> {
        (self.0)()
    }
}

struct Measure<F>(F);
impl<F: Fn() -> Result<ProbeValue> + Send + Sync> Measurement for Measure<F> {
    fn run(&self) -> Result<ProbeValue> {
        (self.0)()
    }
}

struct Transport<F>(F);
impl<F: Fn(&str) -> Result<String> + Send + Sync> MessageTransport for Transport<F> {
    fn send(&self, payload: &str) -> Result<String> {
        (self.0)(payload)
    }
}

pub fn location(f: impl Fn() -> Result<Location> + Send + Sync + 'static) -> Arc<dyn LocationSource> {
    Arc::new(Loc(f))
}

pub fn cell(f: impl Fn() -> Result<RadioCellRecord> + Send + Sync + 'static) -> Arc<dyn CellSource> {
    Arc::new(Cell(f))
}

pub fn measure(f: impl Fn() -> Result<ProbeValue> + Send + Sync + 'static) -> Arc<dyn Measurement> {
    Arc::new(Measure(f))
}

pub fn transport(
    f: impl Fn(&str) -> Result<String> + Send + Sync + 'static,
) -> Arc<dyn MessageTransport> {
    Arc::new(Transport(f))
}

/// Issues `msg-1`, `msg-2`, ... and counts sends.
pub fn counting_transport(sent: Arc<AtomicU64>) -> Arc<dyn MessageTransport> {
    transport(move |_payload| {
        let n = sent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("msg-{n}"))
    })
}

pub fn backends() -> ProbeBackends {
    ProbeBackends {
        location: location(|| {
            Ok(Location {
                latitude: 52.37,
                longitude: 4.89,
            })
        }),
        cell: cell(|| {
            Ok(RadioCellRecord::Lte(LteCell {
                tac: Some(4101),
                ci: Some(27_447_297),
                earfcn: Some(1300),
                pci: Some(214),
                rsrp_dbm: Some(-97),
                ..Default::default()
            }))
        }),
        download: measure(|| Ok(ProbeValue::Throughput { kbps: 12_000.0 })),
        upload: measure(|| Ok(ProbeValue::Throughput { kbps: 3_500.0 })),
        ping: measure(|| Ok(ProbeValue::Latency { millis: 21.0 })),
        dns: measure(|| Ok(ProbeValue::Latency { millis: 4.0 })),
        transport: counting_transport(Arc::new(AtomicU64::new(0))),
    }
}

pub fn all_probes() -> Probes {
    Probes {
        message_round_trip: true,
        ..Probes::default()
    }
}

pub fn config_with(probes: Probes) -> Config {
    Config {
        probes,
        ..Config::default()
    }
}

pub struct Rig {
    pub session: Arc<SessionStore>,
    pub tracker: Arc<CorrelationTracker>,
    pub orchestrator: Arc<SampleOrchestrator>,
}

pub fn rig(backends: ProbeBackends) -> Rig {
    let session = Arc::new(SessionStore::new());
    session.open();
    let tracker = Arc::new(CorrelationTracker::new(session.clone()));
    let orchestrator = Arc::new(SampleOrchestrator::new(
        backends,
        session.clone(),
        tracker.clone(),
    ));
    Rig {
        session,
        tracker,
        orchestrator,
    }
}
