mod common;

use radiodiag::{
    agent::Agent,
    config::Probes,
    correlation::DeliveryEvent,
    probe::{ProbeFailure, ProbeName, ProbeOutcome, ProbeValue},
    session::Phase,
};
use std::time::{Duration, Instant};

fn message_only() -> Probes {
    Probes {
        ping: true,
        message_round_trip: true,
        ..Probes::all_disabled()
    }
}

fn single_cycle_config() -> radiodiag::config::Config {
    let mut cfg = common::config_with(message_only());
    cfg.session.max_cycles = 1;
    cfg.session.interval_ms = 10;
    cfg.message.sweep_interval_ms = 20;
    cfg
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn confirmation_during_session_lands_in_report() {
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    let (live_tx, live_rx) = crossbeam_channel::unbounded();
    let agent = Agent::start(single_cycle_config(), common::backends(), done_rx, Some(live_tx));

    let sample = live_rx.recv_timeout(Duration::from_secs(5)).expect("first sample");
    assert_eq!(sample.sequence, 1);
    assert_eq!(
        sample.outcome(ProbeName::MessageRoundTrip),
        Some(&ProbeOutcome::Pending("msg-1".into()))
    );

    done_tx
        .send(DeliveryEvent {
            correlation_id: "msg-1".into(),
            delivered: true,
            reason: None,
        })
        .unwrap();
    wait_until(|| agent.tracker().pending_len() == 0);

    let report = agent.stop(Duration::from_secs(1));
    assert_eq!(report.sample_count, 1);
    assert!(matches!(
        report.samples[0].outcome(ProbeName::MessageRoundTrip),
        Some(ProbeOutcome::Success(ProbeValue::RoundTrip { .. }))
    ));
    assert!(report.to_text().contains("delivered in"));
}

#[test]
fn unconfirmed_message_reports_pending() {
    let (_done_tx, done_rx) = crossbeam_channel::unbounded();
    let agent = Agent::start(single_cycle_config(), common::backends(), done_rx, None);
    wait_until(|| !agent.is_sampling());

    let session = agent.session().clone();
    let report = agent.stop(Duration::from_millis(50));
    assert_eq!(
        report.samples[0].outcome(ProbeName::MessageRoundTrip),
        Some(&ProbeOutcome::Pending("msg-1".into()))
    );
    assert!(report.to_text().contains("Pending delivery (msg-1)"));
    assert_eq!(session.phase(), Phase::Reported);
}

#[test]
fn grace_period_waits_for_late_confirmation() {
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    let agent = Agent::start(single_cycle_config(), common::backends(), done_rx, None);
    wait_until(|| !agent.is_sampling());

    let sender = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        let _ = done_tx.send(DeliveryEvent {
            correlation_id: "msg-1".into(),
            delivered: false,
            reason: Some("recipient unreachable".into()),
        });
    });

    let report = agent.stop(Duration::from_secs(3));
    sender.join().unwrap();
    assert!(matches!(
        report.samples[0].outcome(ProbeName::MessageRoundTrip),
        Some(ProbeOutcome::Failure(_))
    ));
    assert!(report.to_text().contains("recipient unreachable"));
}

#[test]
fn session_ids_are_unique_per_start() {
    let (_a_tx, a_rx) = crossbeam_channel::unbounded();
    let (_b_tx, b_rx) = crossbeam_channel::unbounded();
    let a = Agent::start(single_cycle_config(), common::backends(), a_rx, None);
    std::thread::sleep(Duration::from_millis(5));
    let b = Agent::start(single_cycle_config(), common::backends(), b_rx, None);
    assert_ne!(a.session_id(), b.session_id());
    assert_eq!(a.session_id().len(), 64);
}

#[test]
fn expiry_sweep_times_out_unconfirmed_message() {
    let mut cfg = single_cycle_config();
    cfg.message.expiry_seconds = 1;
    cfg.message.sweep_interval_ms = 20;
    let (_done_tx, done_rx) = crossbeam_channel::unbounded();
    let agent = Agent::start(cfg, common::backends(), done_rx, None);
    wait_until(|| !agent.is_sampling());

    let report = agent.stop(Duration::from_secs(4));
    assert_eq!(
        report.samples[0].outcome(ProbeName::MessageRoundTrip),
        Some(&ProbeOutcome::Failure(ProbeFailure::Timeout))
    );
}
