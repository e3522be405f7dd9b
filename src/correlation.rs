use crate::{
    probe::{ProbeFailure, ProbeOutcome, ProbeValue},
    session::SessionStore,
    util::lock,
};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCorrelation {
    pub correlation_id: String,
    pub issued_at: Instant,
    pub owner_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub correlation_id: String,
    pub delivered: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    pending: HashMap<String, PendingCorrelation>,
    /// Ids already consumed by a resolution or an expiry, with settle time.
    /// Pruned by the expiry sweep.
    settled: HashMap<String, Instant>,
    /// Completions that beat their own `register`, with arrival time.
    early: HashMap<String, (DeliveryEvent, Instant)>,
}

// Lock order: tracker state, then session store.
#[derive(Debug)]
pub struct CorrelationTracker {
    session: Arc<SessionStore>,
    state: Mutex<TrackerState>,
}

impl CorrelationTracker {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Records a freshly issued message and marks the owning sample's slot
    /// `Pending`. A completion buffered for this id is applied immediately.
    pub fn register(&self, correlation_id: &str, sample_sequence: u64, issued_at: Instant) -> Result<()> {
        let mut st = lock(&self.state);
        if st.pending.contains_key(correlation_id) || st.settled.contains_key(correlation_id) {
            bail!("correlation id already issued: {correlation_id}");
        }
        if !self.session.mark_pending(sample_sequence, correlation_id) {
            bail!("sample {sample_sequence} cannot take a pending message slot");
        }
        let entry = PendingCorrelation {
            correlation_id: correlation_id.to_string(),
            issued_at,
            owner_sequence: sample_sequence,
        };
        debug!(correlation_id, sample_sequence, "correlation registered");

        if let Some((event, received_at)) = st.early.remove(correlation_id) {
            debug!(correlation_id, "applying completion that arrived before registration");
            let outcome = outcome_for(&event, &entry, received_at);
            st.settled.insert(correlation_id.to_string(), Instant::now());
            self.apply(&entry, outcome);
            return Ok(());
        }

        st.pending.insert(correlation_id.to_string(), entry);
        Ok(())
    }

    /// Consumes the pending entry for `correlation_id` and writes `outcome`
    /// into its sample. Returns false for unknown or already-settled ids, so
    /// duplicate delivery events are harmless.
    pub fn resolve(&self, correlation_id: &str, outcome: ProbeOutcome) -> bool {
        let mut st = lock(&self.state);
        let Some(entry) = st.pending.remove(correlation_id) else {
            debug!(correlation_id, "resolve for unknown or settled correlation");
            return false;
        };
        st.settled.insert(entry.correlation_id.clone(), Instant::now());
        self.apply(&entry, outcome);
        true
    }

    /// Resolves from a transport completion. A completion for an id that was
    /// never registered is held until `register` or expiry.
    pub fn complete(&self, event: DeliveryEvent, received_at: Instant) -> bool {
        let mut st = lock(&self.state);
        let id = event.correlation_id.clone();
        if let Some(entry) = st.pending.remove(&id) {
            let outcome = outcome_for(&event, &entry, received_at);
            st.settled.insert(id, Instant::now());
            self.apply(&entry, outcome);
            return true;
        }
        if st.settled.contains_key(&id) {
            debug!(correlation_id = %id, "duplicate completion ignored");
        } else {
            st.early.entry(id).or_insert((event, received_at));
        }
        false
    }

    /// Times out every entry issued before `now - older_than`. Returns the
    /// expired ids.
    pub fn expire(&self, older_than: Duration) -> Vec<String> {
        let Some(cutoff) = Instant::now().checked_sub(older_than) else {
            return Vec::new();
        };
        let mut st = lock(&self.state);
        let stale: Vec<String> = st
            .pending
            .values()
            .filter(|p| p.issued_at < cutoff)
            .map(|p| p.correlation_id.clone())
            .collect();

        for id in &stale {
            if let Some(entry) = st.pending.remove(id) {
                st.settled.insert(id.clone(), Instant::now());
                warn!(
                    correlation_id = %id,
                    sample = entry.owner_sequence,
                    "delivery confirmation expired"
                );
                self.apply(&entry, ProbeOutcome::Failure(ProbeFailure::Timeout));
            }
        }
        st.early.retain(|_, (_, received_at)| *received_at >= cutoff);
        st.settled.retain(|_, settled_at| *settled_at >= cutoff);
        stale
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn settled_len(&self) -> usize {
        lock(&self.state).settled.len()
    }

    pub fn pending(&self, correlation_id: &str) -> Option<PendingCorrelation> {
        lock(&self.state).pending.get(correlation_id).cloned()
    }

    fn apply(&self, entry: &PendingCorrelation, outcome: ProbeOutcome) {
        if self
            .session
            .settle_pending(entry.owner_sequence, &entry.correlation_id, outcome)
        {
            info!(
                correlation_id = %entry.correlation_id,
                sample = entry.owner_sequence,
                "message slot resolved"
            );
        } else {
            debug!(
                correlation_id = %entry.correlation_id,
                sample = entry.owner_sequence,
                "owning sample gone; resolution dropped"
            );
        }
    }
}

fn outcome_for(event: &DeliveryEvent, entry: &PendingCorrelation, received_at: Instant) -> ProbeOutcome {
    if event.delivered {
        let millis = received_at.saturating_duration_since(entry.issued_at).as_millis();
        ProbeOutcome::Success(ProbeValue::RoundTrip {
            millis: u64::try_from(millis).unwrap_or(u64::MAX),
        })
    } else {
        let reason = event
            .reason
            .clone()
            .unwrap_or_else(|| "delivery failed".to_string());
        ProbeOutcome::Failure(ProbeFailure::Transport(reason))
    }
}
