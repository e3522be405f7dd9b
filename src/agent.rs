use crate::{
    collab::ProbeBackends,
    config::Config,
    correlation::{CorrelationTracker, DeliveryEvent},
    orchestrator::SampleOrchestrator,
    report::SessionReport,
    scheduler::Scheduler,
    session::{Sample, SessionStore},
    util::{now_rfc3339, sha256_hex},
};
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Agent {
    session_id: String,
    started: String,
    session: Arc<SessionStore>,
    tracker: Arc<CorrelationTracker>,
    scheduler: Scheduler,
    consumer: Option<JoinHandle<()>>,
    shutdown_tx: Option<Sender<()>>,
}

impl Agent {
    /// Opens a fresh session and starts sampling immediately. Completion
    /// events are read from `completions` until the agent stops.
    pub fn start(
        cfg: Config,
        backends: ProbeBackends,
        completions: Receiver<DeliveryEvent>,
        live: Option<Sender<Sample>>,
    ) -> Self {
        let started = now_rfc3339();
        let session_id = sha256_hex(format!("{}:{}", cfg.normalized_for_hash(), started).as_bytes());
        let cfg = Arc::new(cfg);

        let session = Arc::new(SessionStore::new());
        session.open();
        let tracker = Arc::new(CorrelationTracker::new(session.clone()));
        let orchestrator = Arc::new(SampleOrchestrator::new(
            backends,
            session.clone(),
            tracker.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let consumer = spawn_consumer(
            tracker.clone(),
            completions,
            shutdown_rx,
            cfg.message.sweep_interval(),
            cfg.message.expiry(),
        );

        let mut scheduler = Scheduler::new(orchestrator, cfg.clone(), live);
        scheduler.start(cfg.session.interval());
        info!("session {session_id} started");

        Self {
            session_id,
            started,
            session,
            tracker,
            scheduler,
            consumer,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn tracker(&self) -> &Arc<CorrelationTracker> {
        &self.tracker
    }

    pub fn is_sampling(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stops sampling, gives outstanding confirmations up to `grace` to
    /// arrive, then freezes the session into a report. Confirmations arriving
    /// after this returns are dropped.
    pub fn stop(mut self, grace: Duration) -> SessionReport {
        self.scheduler.stop();
        self.scheduler.join();
        self.session.freeze();

        let deadline = Instant::now() + grace;
        while self.tracker.pending_len() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let unresolved = self.tracker.pending_len();
        if unresolved > 0 {
            warn!("{unresolved} delivery confirmation(s) still pending at report time");
        }

        let samples = self.session.take_for_report();
        self.shutdown_consumer();
        info!("session {} stopped with {} samples", self.session_id, samples.len());

        SessionReport {
            session_id: self.session_id.clone(),
            started: self.started.clone(),
            finished: now_rfc3339(),
            sample_count: samples.len(),
            samples,
        }
    }

    fn shutdown_consumer(&mut self) {
        self.shutdown_tx = None;
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                warn!("completion consumer panicked");
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.shutdown_consumer();
    }
}

fn spawn_consumer(
    tracker: Arc<CorrelationTracker>,
    completions: Receiver<DeliveryEvent>,
    shutdown: Receiver<()>,
    sweep_every: Duration,
    expiry: Duration,
) -> Option<JoinHandle<()>> {
    let spawned = std::thread::Builder::new()
        .name("completion-consumer".into())
        .spawn(move || {
            let mut completions = completions;
            let ticker = crossbeam_channel::tick(sweep_every);
            loop {
                select! {
                    recv(completions) -> ev => match ev {
                        Ok(ev) => {
                            tracker.complete(ev, Instant::now());
                        }
                        Err(_) => {
                            debug!("completion channel closed; expiry sweep continues");
                            completions = crossbeam_channel::never();
                        }
                    },
                    recv(ticker) -> _ => {
                        tracker.expire(expiry);
                    },
                    recv(shutdown) -> _ => break,
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("failed to spawn completion consumer: {e}");
            None
        }
    }
}
