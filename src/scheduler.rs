use crate::{config::Config, orchestrator::SampleOrchestrator, session::Sample, util::lock};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

// Held only while checking `running` and assigning a sequence; never while
// probes run.
#[derive(Debug)]
struct Gate {
    running: bool,
    /// Bumped on every start so a stopped driver never picks up again.
    generation: u64,
    next_sequence: u64,
    /// Last sequence to run, if bounded.
    last_sequence: Option<u64>,
}

pub struct Scheduler {
    orchestrator: Arc<SampleOrchestrator>,
    config: Arc<Config>,
    gate: Arc<Mutex<Gate>>,
    live: Option<Sender<Sample>>,
    wake_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<SampleOrchestrator>,
        config: Arc<Config>,
        live: Option<Sender<Sample>>,
    ) -> Self {
        let last_sequence = match config.session.max_cycles {
            0 => None,
            n => Some(n),
        };
        Self {
            orchestrator,
            config,
            gate: Arc::new(Mutex::new(Gate {
                running: false,
                generation: 0,
                next_sequence: 1,
                last_sequence,
            })),
            live,
            wake_tx: None,
            handle: None,
        }
    }

    /// Starts firing cycles. A no-op while already running.
    pub fn start(&mut self, interval: Duration) {
        let generation = {
            let mut gate = lock(&self.gate);
            if gate.running {
                debug!("scheduler already running; start ignored");
                return;
            }
            gate.running = true;
            gate.generation += 1;
            gate.generation
        };
        // An older driver exits on its next gate check or wake.
        self.join();

        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        self.wake_tx = Some(wake_tx);

        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();
        let gate = self.gate.clone();
        let live = self.live.clone();

        info!("scheduler start interval={interval:?}");
        let spawned = std::thread::Builder::new()
            .name("cycle-driver".into())
            .spawn(move || {
                loop {
                    let sequence = {
                        let mut g = lock(&gate);
                        if !g.running || g.generation != generation {
                            break;
                        }
                        if g.last_sequence.is_some_and(|last| g.next_sequence > last) {
                            g.running = false;
                            info!("scheduler reached its cycle limit");
                            break;
                        }
                        let sequence = g.next_sequence;
                        g.next_sequence += 1;
                        orchestrator.start_cycle(sequence, &config);
                        sequence
                    };

                    let sample = orchestrator.finish_cycle(sequence, &config);
                    if let Some(tx) = &live {
                        let _ = tx.send(sample);
                    }

                    match wake_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("cycle driver exiting");
            });

        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                warn!("failed to spawn cycle driver: {e}");
                lock(&self.gate).running = false;
                self.wake_tx = None;
            }
        }
    }

    /// After this returns no new cycle starts. A cycle already past the start
    /// gate may still be finishing; use [`Self::join`] to wait for it.
    pub fn stop(&mut self) {
        let was_running = {
            let mut gate = lock(&self.gate);
            std::mem::replace(&mut gate.running, false)
        };
        // Dropping the sender wakes the driver out of its interval sleep.
        self.wake_tx = None;
        if was_running {
            info!("scheduler stopped");
        }
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cycle driver panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.gate).running
    }

    pub fn next_sequence(&self) -> u64 {
        lock(&self.gate).next_sequence
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
