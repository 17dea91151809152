//! Drives the full control loop against in-process transport doubles with an
//! explicit clock.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use pedguard_kernel::{ScriptedEntropy, TxOutcome};
use pedguard_middleware::{Drained, SimCommandSink, SimTelemetrySource};
use pedguard_recorder::MemoryRecorder;
use pedguard_runtime::ControlLoop;
use pedguard_types::{Command, CommandPayload, DelayMode, FaultConfig, GuardConfig, Verbosity};

struct Harness {
    control: ControlLoop,
    sink: SimCommandSink,
    records: MemoryRecorder,
    t0: Instant,
}

impl Harness {
    fn new(config: GuardConfig, entropy: Vec<f64>) -> Self {
        let (source, _feed) = SimTelemetrySource::new(config.max_drain);
        let sink = SimCommandSink::new();
        let records = MemoryRecorder::new();
        let control = ControlLoop::new(
            config,
            Box::new(source),
            Box::new(sink.clone()),
            Box::new(records.clone()),
            Box::new(ScriptedEntropy::new(entropy)),
        );
        Self {
            control,
            sink,
            records,
            t0: Instant::now(),
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    async fn frame(&mut self, ms: u64, json: &str) {
        let polled = Drained {
            latest: json.as_bytes().to_vec(),
            received: 1,
        };
        let now = self.at(ms);
        self.control.tick(Some(polled), now).await;
    }

    async fn idle(&mut self, ms: u64) {
        let now = self.at(ms);
        self.control.tick(None, now).await;
    }
}

fn quiet_config() -> GuardConfig {
    GuardConfig {
        verbosity: Verbosity::Quiet,
        ..GuardConfig::default()
    }
}

fn chaos_config(faults: FaultConfig, delay_mode: DelayMode) -> GuardConfig {
    GuardConfig {
        safe_mode: false,
        faults,
        delay_mode,
        ..quiet_config()
    }
}

const PED_CLOSE: &str = r#"{"speed":40,"pedestrian_detected":true,"distance":4.0}"#;
const NO_PED: &str = r#"{"speed":40,"pedestrian_detected":false,"distance":null}"#;

#[tokio::test]
async fn brake_then_debounced_resume() {
    let mut h = Harness::new(quiet_config(), Vec::new());

    h.frame(0, PED_CLOSE).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert!(h.control.state().braking_active());

    for (i, ms) in [100, 200, 300, 400].into_iter().enumerate() {
        h.frame(ms, NO_PED).await;
        assert_eq!(h.sink.sent().len(), 1, "resume leaked on no-ped frame {}", i + 1);
    }
    assert_eq!(h.control.stats().resume_debounced, 4);
    assert!(h.control.state().braking_active());

    h.frame(600, NO_PED).await;
    assert_eq!(
        h.sink.sent(),
        vec![CommandPayload::Brake, CommandPayload::Resume]
    );
    assert!(!h.control.state().braking_active());

    let records = h.records.cycles();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].decision, Some(Command::Brake));
    assert_eq!(records[0].outcome, TxOutcome::Sent);
    assert_eq!(records[1].decision, None);
    assert_eq!(records[1].reason_type, "Debounce resume");
    assert_eq!(records[1].outcome, TxOutcome::NoCommand);
    assert_eq!(records[5].decision, Some(Command::Resume));
}

#[tokio::test]
async fn min_hold_blocks_early_resume() {
    let config = GuardConfig {
        no_ped_frames: 1,
        min_brake_hold_s: 1.0,
        ..quiet_config()
    };
    let mut h = Harness::new(config, Vec::new());

    h.frame(0, PED_CLOSE).await;
    h.frame(300, NO_PED).await;
    let records = h.records.cycles();
    assert_eq!(records[1].reason_detail, "min_hold 1.00s");
    assert_eq!(h.sink.sent().len(), 1);

    for ms in [600, 900] {
        h.frame(ms, NO_PED).await;
    }
    assert_eq!(h.sink.sent().len(), 1);
    h.frame(1_000, NO_PED).await;
    assert_eq!(h.sink.sent().last(), Some(&CommandPayload::Resume));
}

#[tokio::test]
async fn identical_commands_within_cooldown_send_once() {
    let mut h = Harness::new(quiet_config(), Vec::new());

    h.frame(0, PED_CLOSE).await;
    h.frame(100, PED_CLOSE).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(h.control.stats().rate_limited, 1);
    assert_eq!(h.records.cycles()[1].outcome, TxOutcome::RateLimited);

    h.frame(300, PED_CLOSE).await;
    assert_eq!(h.sink.sent().len(), 2);
    assert_eq!(h.control.stats().brakes_sent, 2);
}

#[tokio::test]
async fn slowdown_carries_rounded_distance() {
    let mut h = Harness::new(quiet_config(), Vec::new());
    h.frame(0, r#"{"speed":30,"pedestrian_detected":true,"distance":9.876}"#)
        .await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Slowdown { distance: 9.88 }]);
    assert!(!h.control.state().braking_active());
    assert_eq!(h.control.stats().slowdowns_sent, 1);
}

#[tokio::test]
async fn stale_link_gets_exactly_one_fail_safe_brake() {
    let mut h = Harness::new(quiet_config(), Vec::new());

    h.frame(0, NO_PED).await;
    assert!(h.sink.sent().is_empty());

    h.idle(400).await;
    assert!(h.sink.sent().is_empty());

    h.idle(600).await;
    h.idle(700).await;
    h.idle(2_000).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(h.control.stats().stale_enforced, 1);
    assert!(h.control.state().stale_asserted());

    let stale: Vec<_> = h
        .records
        .cycles()
        .into_iter()
        .filter(|r| r.reason_type == "No data reached")
        .collect();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].speed_kmh, -1.0);
    assert_eq!(stale[0].reason_detail, "> 0.50s");

    // Fresh telemetry re-arms the watchdog.
    h.frame(2_100, NO_PED).await;
    assert!(!h.control.state().stale_asserted());
    h.idle(2_700).await;
    assert_eq!(h.control.stats().stale_enforced, 2);
}

#[tokio::test]
async fn failed_fail_safe_brake_is_retried() {
    let mut h = Harness::new(quiet_config(), Vec::new());
    h.frame(0, NO_PED).await;
    h.sink.fail_next(1);

    h.idle(600).await;
    assert_eq!(h.control.stats().send_errors, 1);
    assert!(!h.control.state().stale_asserted());

    h.idle(650).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(h.control.stats().stale_enforced, 1);
    assert_eq!(h.control.stats().commands_attempted, 2);
    assert_eq!(h.records.cycles().len(), 3);
}

#[tokio::test]
async fn no_staleness_before_first_frame() {
    let mut h = Harness::new(quiet_config(), Vec::new());
    h.idle(10_000).await;
    assert!(h.sink.sent().is_empty());
    assert!(h.records.cycles().is_empty());
}

#[tokio::test]
async fn undecodable_payload_is_counted_and_skipped() {
    let mut h = Harness::new(quiet_config(), Vec::new());
    h.frame(0, "not json").await;
    assert_eq!(h.control.stats().decode_errors, 1);
    assert_eq!(h.control.stats().packets_received, 1);
    assert_eq!(h.control.stats().packets_parsed, 0);
    assert!(h.records.cycles().is_empty());

    // A bad payload does not refresh the link.
    h.idle(5_000).await;
    assert!(h.sink.sent().is_empty());
}

#[tokio::test]
async fn backlog_counters_follow_drain() {
    let mut h = Harness::new(quiet_config(), Vec::new());
    let now = h.at(0);
    h.control
        .tick(
            Some(Drained {
                latest: NO_PED.as_bytes().to_vec(),
                received: 4,
            }),
            now,
        )
        .await;
    let stats = h.control.stats();
    assert_eq!(stats.packets_received, 4);
    assert_eq!(stats.backlog_batches, 1);
    assert_eq!(stats.backlog_dropped, 3);
    assert_eq!(stats.packets_parsed, 1);
}

#[tokio::test]
async fn safe_mode_ignores_configured_faults() {
    let config = GuardConfig {
        faults: FaultConfig {
            flip_prob: 1.0,
            drop_prob: 1.0,
            delay_min_s: 0.5,
            delay_max_s: 0.5,
        },
        ..quiet_config()
    };
    let mut h = Harness::new(config, vec![0.0]);
    h.frame(0, PED_CLOSE).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    let stats = h.control.stats();
    assert_eq!((stats.flips, stats.drops, stats.delays_scheduled), (0, 0, 0));
    assert_eq!(h.records.cycles()[0].fault, "None");
}

#[tokio::test]
async fn dropped_command_is_not_sent_and_keeps_state() {
    let faults = FaultConfig {
        drop_prob: 1.0,
        ..FaultConfig::NONE
    };
    // Flip draw, then drop draw.
    let mut h = Harness::new(chaos_config(faults, DelayMode::Scheduled), vec![0.9, 0.0]);
    h.frame(0, PED_CLOSE).await;

    assert!(h.sink.sent().is_empty());
    assert!(!h.control.state().braking_active());
    let stats = h.control.stats();
    assert_eq!(stats.drops, 1);
    assert_eq!(stats.commands_attempted, 1);
    let record = &h.records.cycles()[0];
    assert_eq!(record.outcome, TxOutcome::Dropped);
    assert_eq!(record.decision, Some(Command::Brake));
    assert_eq!(record.reason_type, "Dropped command");
}

#[tokio::test]
async fn flipped_brake_goes_out_as_resume() {
    let faults = FaultConfig {
        flip_prob: 1.0,
        ..FaultConfig::NONE
    };
    let mut h = Harness::new(chaos_config(faults, DelayMode::Scheduled), vec![0.0, 0.9]);
    h.frame(0, PED_CLOSE).await;

    assert_eq!(h.sink.sent(), vec![CommandPayload::Resume]);
    assert!(!h.control.state().braking_active());
    assert_eq!(h.control.stats().flips, 1);
    let record = &h.records.cycles()[0];
    assert_eq!(record.decision, Some(Command::Brake));
    assert_eq!(record.fault, "Flip");
}

#[tokio::test]
async fn scheduled_delay_sends_when_due() {
    let faults = FaultConfig {
        delay_min_s: 0.2,
        delay_max_s: 0.2,
        ..FaultConfig::NONE
    };
    let mut h = Harness::new(chaos_config(faults, DelayMode::Scheduled), vec![0.9]);

    h.frame(0, PED_CLOSE).await;
    assert!(h.sink.sent().is_empty());
    assert!(!h.control.state().braking_active());
    assert_eq!(h.control.pending(), 1);
    assert_eq!(h.records.cycles()[0].outcome, TxOutcome::Scheduled);

    h.idle(100).await;
    assert!(h.sink.sent().is_empty());

    h.idle(250).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert!(h.control.state().braking_active());
    assert_eq!(h.control.pending(), 0);
    assert_eq!(h.control.stats().delays_scheduled, 1);
}

#[tokio::test]
async fn stale_brake_cancels_pending_delays() {
    let faults = FaultConfig {
        delay_min_s: 1.0,
        delay_max_s: 1.0,
        ..FaultConfig::NONE
    };
    let mut h = Harness::new(chaos_config(faults, DelayMode::Scheduled), vec![0.9]);

    h.frame(0, NO_PED).await;
    h.frame(100, r#"{"pedestrian_detected":true,"distance":10.0}"#)
        .await;
    assert_eq!(h.control.pending(), 1);

    h.idle(700).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(h.control.pending(), 0);
    assert_eq!(h.control.stats().scheduled_discarded, 1);

    h.idle(1_200).await;
    assert_eq!(h.sink.sent().len(), 1);
}

fn delayed_resume_config() -> GuardConfig {
    let faults = FaultConfig {
        delay_min_s: 0.0,
        delay_max_s: 1.0,
        ..FaultConfig::NONE
    };
    GuardConfig {
        no_ped_frames: 1,
        min_brake_hold_s: 0.5,
        stale_timeout_s: 5.0,
        ..chaos_config(faults, DelayMode::Scheduled)
    }
}

// Flip, drop and delay draws for one command.
fn draws(delay: f64) -> [f64; 3] {
    [0.9, 0.9, delay]
}

#[tokio::test]
async fn delayed_resume_is_withdrawn_after_a_newer_brake() {
    let script = [draws(0.0), draws(0.9), draws(0.0), draws(0.0), draws(0.0)].concat();
    let mut h = Harness::new(delayed_resume_config(), script);

    h.frame(0, PED_CLOSE).await;
    h.frame(600, NO_PED).await;
    assert_eq!(h.control.pending(), 1);

    h.frame(700, PED_CLOSE).await;
    h.frame(1_000, PED_CLOSE).await;
    h.frame(1_300, PED_CLOSE).await;
    h.idle(1_550).await;

    let sent = h.sink.sent();
    assert!(!sent.contains(&CommandPayload::Resume), "resume leaked: {sent:?}");
    assert!(h.control.state().braking_active());
    assert_eq!(h.control.pending(), 0);
    assert_eq!(h.control.stats().scheduled_discarded, 1);
    assert_eq!(h.control.stats().resumes_sent, 0);

    let last = h.records.cycles().pop().expect("release record");
    assert_eq!(last.decision, Some(Command::Resume));
    assert_eq!(last.outcome, TxOutcome::Cancelled);
    assert_eq!(last.reason_type, "Debounce resume");
    assert_eq!(last.reason_detail, "min_hold 0.50s");
}

#[tokio::test]
async fn delayed_resume_goes_out_when_still_clear() {
    let script = [draws(0.0), draws(0.3)].concat();
    let mut h = Harness::new(delayed_resume_config(), script);

    h.frame(0, PED_CLOSE).await;
    h.frame(600, NO_PED).await;
    assert_eq!(h.control.pending(), 1);

    h.idle(950).await;
    assert_eq!(
        h.sink.sent(),
        vec![CommandPayload::Brake, CommandPayload::Resume]
    );
    assert!(!h.control.state().braking_active());

    let records = h.records.cycles();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].outcome, TxOutcome::Scheduled);
    assert_eq!(records[2].decision, Some(Command::Resume));
    assert_eq!(records[2].fault, "Delay");
    assert_eq!(records[2].outcome, TxOutcome::Sent);
}

#[tokio::test(start_paused = true)]
async fn blocking_delay_sends_in_the_same_cycle() {
    let faults = FaultConfig {
        delay_min_s: 0.05,
        delay_max_s: 0.05,
        ..FaultConfig::NONE
    };
    let mut h = Harness::new(chaos_config(faults, DelayMode::Blocking), vec![0.9]);
    h.frame(0, PED_CLOSE).await;
    assert_eq!(h.sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(h.control.pending(), 0);
    assert!((h.control.stats().total_delay_s - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn shutdown_discards_pending_and_summarises() {
    let faults = FaultConfig {
        delay_min_s: 5.0,
        delay_max_s: 5.0,
        ..FaultConfig::NONE
    };
    let mut h = Harness::new(chaos_config(faults, DelayMode::Scheduled), vec![0.9]);
    h.frame(0, PED_CLOSE).await;
    assert_eq!(h.control.pending(), 1);

    let shutdown = Arc::new(AtomicBool::new(true));
    h.control.run(shutdown).await;
    assert_eq!(h.control.pending(), 0);
    assert_eq!(h.control.stats().scheduled_discarded, 1);

    let started = chrono::Local::now();
    let summary = h.control.summary("session_test", started, started);
    h.control.record_summary(&summary);
    let summaries = h.records.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].stats.scheduled_discarded, 1);
    assert_eq!(summaries[0].stats.commands_sent, 0);
}

#[tokio::test]
async fn step_pulls_from_the_source() {
    let (source, feed) = SimTelemetrySource::new(1024);
    let sink = SimCommandSink::new();
    let mut control = ControlLoop::new(
        quiet_config(),
        Box::new(source),
        Box::new(sink.clone()),
        Box::new(MemoryRecorder::new()),
        Box::new(ScriptedEntropy::new(Vec::new())),
    );
    feed.push(NO_PED);
    feed.push(PED_CLOSE);
    control.step().await;

    assert_eq!(sink.sent(), vec![CommandPayload::Brake]);
    assert_eq!(control.stats().backlog_dropped, 1);
}
