use crate::{
    config::Probes,
    probe::{ProbeName, ProbeOutcome},
    util::lock,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub probe_results: BTreeMap<ProbeName, ProbeOutcome>,
}

impl Sample {
    pub fn new(sequence: u64, timestamp: OffsetDateTime, probes: &Probes) -> Self {
        let probe_results = ProbeName::ALL
            .iter()
            .filter(|p| !probes.enabled(**p))
            .map(|p| (*p, ProbeOutcome::Disabled))
            .collect();
        Self {
            sequence,
            timestamp,
            probe_results,
        }
    }

    pub fn outcome(&self, probe: ProbeName) -> Option<&ProbeOutcome> {
        self.probe_results.get(&probe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Open,
    Frozen,
    /// Samples handed to the report; every later mutation is dropped.
    Reported,
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    samples: Vec<Sample>,
}

impl SessionState {
    fn accepts_updates(&self) -> bool {
        matches!(self.phase, Phase::Open | Phase::Frozen)
    }

    fn find_mut(&mut self, sequence: u64) -> Option<&mut Sample> {
        // Samples are appended in sequence order.
        let idx = self
            .samples
            .binary_search_by_key(&sequence, |s| s.sequence)
            .ok()?;
        self.samples.get_mut(idx)
    }
}

#[derive(Debug)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                samples: Vec::new(),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    pub fn open(&self) {
        let mut st = lock(&self.state);
        st.samples.clear();
        st.phase = Phase::Open;
    }

    pub fn freeze(&self) {
        let mut st = lock(&self.state);
        if st.phase == Phase::Open {
            st.phase = Phase::Frozen;
        }
    }

    pub fn begin_sample(&self, sample: Sample) -> bool {
        let mut st = lock(&self.state);
        if st.phase != Phase::Open {
            debug!(sequence = sample.sequence, "session not open; sample not recorded");
            return false;
        }
        if st
            .samples
            .last()
            .is_some_and(|last| last.sequence >= sample.sequence)
        {
            return false;
        }
        st.samples.push(sample);
        true
    }

    /// Writes a slot that has not been written yet. Slots are write-once.
    pub fn record(&self, sequence: u64, probe: ProbeName, outcome: ProbeOutcome) -> bool {
        let mut st = lock(&self.state);
        if !st.accepts_updates() {
            return false;
        }
        let Some(sample) = st.find_mut(sequence) else {
            return false;
        };
        if sample.probe_results.contains_key(&probe) {
            return false;
        }
        sample.probe_results.insert(probe, outcome);
        true
    }

    pub fn mark_pending(&self, sequence: u64, correlation_id: &str) -> bool {
        self.record(
            sequence,
            ProbeName::MessageRoundTrip,
            ProbeOutcome::Pending(correlation_id.to_string()),
        )
    }

    /// Moves the message slot from `Pending(correlation_id)` to `outcome`.
    /// Anything else (slot missing, other id, already terminal, session
    /// reported) leaves the sample untouched.
    pub fn settle_pending(
        &self,
        sequence: u64,
        correlation_id: &str,
        outcome: ProbeOutcome,
    ) -> bool {
        let mut st = lock(&self.state);
        if !st.accepts_updates() {
            return false;
        }
        let Some(sample) = st.find_mut(sequence) else {
            return false;
        };
        match sample.probe_results.get_mut(&ProbeName::MessageRoundTrip) {
            Some(slot) if matches!(&*slot, ProbeOutcome::Pending(id) if id == correlation_id) => {
                *slot = outcome;
                true
            }
            _ => false,
        }
    }

    pub fn sample(&self, sequence: u64) -> Option<Sample> {
        let st = lock(&self.state);
        st.samples
            .binary_search_by_key(&sequence, |s| s.sequence)
            .ok()
            .map(|idx| st.samples[idx].clone())
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        lock(&self.state).samples.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands the samples over for reporting. The store is empty afterwards and
    /// refuses further updates until reopened.
    pub fn take_for_report(&self) -> Vec<Sample> {
        let mut st = lock(&self.state);
        st.phase = Phase::Reported;
        std::mem::take(&mut st.samples)
    }
}
