use crate::{
    collab::ProbeBackends,
    config::Config,
    correlation::CorrelationTracker,
    probe::{ProbeFailure, ProbeName, ProbeOutcome, ProbeValue},
    session::{Sample, SessionStore},
};
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Runs one sampling cycle: every enabled probe concurrently, then fan-in.
pub struct SampleOrchestrator {
    backends: ProbeBackends,
    session: Arc<SessionStore>,
    tracker: Arc<CorrelationTracker>,
}

impl SampleOrchestrator {
    pub fn new(
        backends: ProbeBackends,
        session: Arc<SessionStore>,
        tracker: Arc<CorrelationTracker>,
    ) -> Self {
        Self {
            backends,
            session,
            tracker,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn run_cycle(&self, sequence: u64, cfg: &Config) -> Sample {
        self.start_cycle(sequence, cfg);
        self.finish_cycle(sequence, cfg)
    }

    /// Creates the sample and appends it to the session. Split from
    /// [`Self::finish_cycle`] so the scheduler can do this under its start gate.
    pub fn start_cycle(&self, sequence: u64, cfg: &Config) -> bool {
        let sample = Sample::new(sequence, OffsetDateTime::now_utc(), &cfg.probes);
        let appended = self.session.begin_sample(sample);
        if !appended {
            warn!("cycle {sequence}: sample not appended to session");
        }
        appended
    }

    /// Fans out to every enabled probe and waits for all of them. A probe that
    /// errors or panics becomes a `Failure` entry; siblings are unaffected.
    pub fn finish_cycle(&self, sequence: u64, cfg: &Config) -> Sample {
        let started = Instant::now();
        let enabled: Vec<ProbeName> = ProbeName::ALL
            .iter()
            .copied()
            .filter(|p| cfg.probes.enabled(*p))
            .collect();
        info!("cycle {sequence} start enabled={}", enabled.len());

        let results: Vec<(ProbeName, ProbeOutcome)> = thread::scope(|s| {
            let handles: Vec<_> = enabled
                .iter()
                .map(|&probe| (probe, s.spawn(move || self.run_probe(probe, sequence, cfg))))
                .collect();
            handles
                .into_iter()
                .map(|(probe, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        warn!("cycle {sequence}: {probe} probe panicked");
                        ProbeOutcome::Failure(ProbeFailure::Transport("probe panicked".into()))
                    });
                    (probe, outcome)
                })
                .collect()
        });

        let mut local = Sample::new(sequence, OffsetDateTime::now_utc(), &cfg.probes);
        for (probe, outcome) in results {
            if let ProbeOutcome::Failure(reason) = &outcome {
                warn!("cycle {sequence}: {probe} failed: {reason}");
            }
            // Pending slots were written by the tracker at registration.
            if !outcome.is_pending() {
                self.session.record(sequence, probe, outcome.clone());
            }
            local.probe_results.insert(probe, outcome);
        }

        info!("cycle {sequence} done in {:?}", started.elapsed());
        // The session copy may already carry a resolved message slot.
        self.session.sample(sequence).unwrap_or(local)
    }

    fn run_probe(&self, probe: ProbeName, sequence: u64, cfg: &Config) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = match probe {
            ProbeName::Location => {
                ProbeOutcome::from_result(self.backends.location.read().map(ProbeValue::Location))
            }
            ProbeName::CellInfo => ProbeOutcome::from_result(
                self.backends
                    .cell
                    .read()
                    .map(|rec| ProbeValue::Cell(rec.decoded())),
            ),
            ProbeName::Download => ProbeOutcome::from_result(self.backends.download.run()),
            ProbeName::Upload => ProbeOutcome::from_result(self.backends.upload.run()),
            ProbeName::Ping => ProbeOutcome::from_result(self.backends.ping.run()),
            ProbeName::Dns => ProbeOutcome::from_result(self.backends.dns.run()),
            ProbeName::MessageRoundTrip => self.issue_message(sequence, cfg),
        };
        debug!("cycle {sequence}: {probe} finished in {:?}", started.elapsed());
        outcome
    }

    fn issue_message(&self, sequence: u64, cfg: &Config) -> ProbeOutcome {
        if !cfg.message.fires_on(sequence) {
            return ProbeOutcome::Success(ProbeValue::Skipped);
        }
        let issued_at = Instant::now();
        match self.send_and_register(sequence, &cfg.message.payload, issued_at) {
            Ok(id) => ProbeOutcome::Pending(id),
            Err(err) => ProbeOutcome::Failure(ProbeFailure::from_error(&err)),
        }
    }

    fn send_and_register(&self, sequence: u64, payload: &str, issued_at: Instant) -> Result<String> {
        let id = self.backends.transport.send(payload)?;
        self.tracker.register(&id, sequence, issued_at)?;
        debug!("cycle {sequence}: message issued correlation_id={id}");
        Ok(id)
    }
}
