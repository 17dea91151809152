//! [`ControlLoop`] – the single-threaded safety controller.
//!
//! Each iteration:
//!
//! 1. **Poll** – wait (bounded by the poll interval and the next scheduled
//!    transmission) for telemetry and drain the backlog, keeping the newest
//!    datagram.
//! 2. **Watch** – run the staleness watchdog whether or not anything arrived.
//!    A stale link forces a fail-safe brake through the dispatcher.
//! 3. **Flush** – transmit delayed commands that have come due; a delayed
//!    resume that no longer passes the debounce policy is withdrawn.
//! 4. **Process** – decode the newest frame, decide, debounce resumes, inject
//!    faults, then send, schedule, or drop the command and emit a record.
//!
//! [`ControlLoop::tick`] takes the time as an argument so that the whole
//! pipeline can be driven deterministically from tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use pedguard_kernel::{
    ControllerState, EntropySource, FaultInjector, ResumeHysteresis, Staleness,
    StalenessWatchdog, Stats, TxGate, TxOutcome, decide, map_to_payload,
};
use pedguard_middleware::{CommandSink, Drained, TelemetrySource, decode};
use pedguard_recorder::{CycleRecord, Recorder, SessionSummary, timestamp};
use pedguard_types::{CommandPayload, DelayMode, Decision, GuardConfig, Thresholds};
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::dispatch::Dispatcher;
use crate::schedule::Schedule;

/// One-way latency estimate in seconds.
///
/// `recv_epoch - send_time` when the sender's clock is not ahead of ours,
/// otherwise (or without a timestamp) zero.
pub fn latency_estimate(recv_epoch: f64, send_time: Option<f64>) -> f64 {
    match send_time {
        Some(sent) if sent.is_finite() && sent <= recv_epoch => recv_epoch - sent,
        _ => 0.0,
    }
}

fn epoch_seconds(at: DateTime<Local>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub struct ControlLoop {
    config: GuardConfig,
    thresholds: Thresholds,
    state: ControllerState,
    stats: Stats,
    hysteresis: ResumeHysteresis,
    injector: FaultInjector,
    watchdog: StalenessWatchdog,
    dispatcher: Dispatcher,
    schedule: Schedule,
    source: Box<dyn TelemetrySource>,
    recorder: Box<dyn Recorder>,
    console: Console,
}

impl ControlLoop {
    /// Assemble the loop from its configuration and collaborators.
    ///
    /// The safety override in `config` disables fault injection regardless
    /// of `entropy`.
    pub fn new(
        config: GuardConfig,
        source: Box<dyn TelemetrySource>,
        sink: Box<dyn CommandSink>,
        recorder: Box<dyn Recorder>,
        entropy: Box<dyn EntropySource>,
    ) -> Self {
        let console = Console::new(config.verbosity);
        if !config.slowdown_enabled() {
            warn!(
                brake_range_m = config.brake_range_m,
                slowdown_start_m = config.slowdown_start_m,
                "slowdown disabled: brake range is not below slowdown start"
            );
        }
        Self {
            thresholds: config.thresholds(),
            state: ControllerState::new(),
            stats: Stats::default(),
            hysteresis: ResumeHysteresis::new(config.no_ped_frames, config.min_brake_hold()),
            injector: FaultInjector::from_config(&config, entropy),
            watchdog: StalenessWatchdog::new(config.stale_timeout()),
            dispatcher: Dispatcher::new(TxGate::new(config.cooldown()), sink, console),
            schedule: Schedule::new(),
            source,
            recorder,
            console,
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Delayed transmissions not yet sent.
    pub fn pending(&self) -> usize {
        self.schedule.len()
    }

    // ── Driving ─────────────────────────────────────────────────────────────

    /// Iterate until `shutdown` is raised, then discard pending delayed
    /// transmissions.  The flag is checked between iterations, so a
    /// transmission in flight always completes.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(
            endpoint = %self.dispatcher.endpoint(),
            safe_mode = self.config.safe_mode,
            delay_mode = %self.config.delay_mode,
            "control loop started"
        );
        while !shutdown.load(Ordering::SeqCst) {
            self.step().await;
        }
        self.finish();
    }

    /// One full iteration against the real clock.
    pub async fn step(&mut self) {
        let wait = self
            .schedule
            .wait_budget(Instant::now(), self.config.poll_interval());
        let polled = self.source.poll_latest(wait).await;
        self.tick(polled, Instant::now()).await;
    }

    /// Everything after the poll, evaluated at `now`.
    pub async fn tick(&mut self, polled: Option<Drained>, now: Instant) {
        if let Some(drained) = &polled {
            self.stats.packets_received += drained.received as u64;
            self.stats.backlog_batches += 1;
            self.stats.backlog_dropped += drained.discarded() as u64;
        }

        self.enforce_staleness(now).await;
        self.flush_due(now).await;

        if let Some(drained) = polled {
            self.process_payload(&drained.latest, now).await;
        }
    }

    /// Discard delayed transmissions that never came due.
    pub fn finish(&mut self) {
        let discarded = self.schedule.clear();
        if discarded > 0 {
            self.stats.scheduled_discarded += discarded as u64;
            info!(discarded, "pending delayed transmissions discarded at shutdown");
        }
    }

    // ── Watchdog ────────────────────────────────────────────────────────────

    async fn enforce_staleness(&mut self, now: Instant) {
        let Staleness::Stale { silent_for } = self.watchdog.check(&self.state, now) else {
            return;
        };
        let stamp = timestamp(Local::now());
        let reason = self.watchdog.reason();
        let payload = self.watchdog.fail_safe_payload();

        self.stats.commands_attempted += 1;
        let outcome = self
            .dispatcher
            .transmit(
                &payload,
                &reason,
                &stamp,
                &mut self.state,
                &mut self.stats,
                now,
            )
            .await;

        if outcome == TxOutcome::Sent {
            self.stats.stale_enforced += 1;
            self.state.assert_stale();
            let cancelled = self.schedule.clear();
            self.stats.scheduled_discarded += cancelled as u64;
            warn!(
                silent_ms = silent_for.as_millis() as u64,
                cancelled, "telemetry stale: fail-safe brake sent"
            );
        } else {
            warn!(
                silent_ms = silent_for.as_millis() as u64,
                outcome = %outcome,
                "telemetry stale: fail-safe brake not sent, retrying"
            );
        }

        self.record(&CycleRecord::stale(stamp, &reason, outcome));
    }

    // ── Delayed transmissions ───────────────────────────────────────────────

    /// Transmit due entries.  A delayed resume is re-checked against the
    /// debounce policy at release: a brake or a pedestrian frame seen since
    /// it was queued withdraws it.
    async fn flush_due(&mut self, now: Instant) {
        for pending in self.schedule.take_due(now) {
            let stamp = timestamp(Local::now());
            let command = pending.payload.command();

            let recheck = self.hysteresis.gate(
                Decision::new(Some(command), pending.reason.clone()),
                &self.state,
                now,
            );
            if recheck.debounced {
                self.stats.scheduled_discarded += 1;
                info!(
                    command = %command,
                    reason = %recheck.decision.reason,
                    "delayed transmission withdrawn"
                );
                self.console.no_tx(&stamp, &recheck.decision.reason);
                self.record(&CycleRecord::released(
                    stamp,
                    command,
                    &recheck.decision.reason,
                    TxOutcome::Cancelled,
                ));
                continue;
            }

            let outcome = self
                .dispatcher
                .transmit(
                    &pending.payload,
                    &pending.reason,
                    &stamp,
                    &mut self.state,
                    &mut self.stats,
                    now,
                )
                .await;
            info!(
                command = %command,
                outcome = %outcome,
                "delayed transmission released"
            );
            self.record(&CycleRecord::released(
                stamp,
                command,
                &pending.reason,
                outcome,
            ));
        }
    }

    // ── Frame processing ────────────────────────────────────────────────────

    /// Run one raw telemetry payload through the decision pipeline.
    pub async fn process_payload(&mut self, raw: &[u8], now: Instant) {
        let received_at = Local::now();
        let stamp = timestamp(received_at);

        let frame = match decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!(error = %e, bytes = raw.len(), "dropping undecodable telemetry");
                self.console.decode_failed(&stamp, &e.to_string());
                return;
            }
        };
        self.stats.packets_parsed += 1;
        self.state.observe_frame(frame.pedestrian_detected, now);
        let latency = latency_estimate(epoch_seconds(received_at), frame.send_time);

        let proposed = decide(&frame, self.state.braking_active(), &self.thresholds);
        if proposed.command.is_none() {
            self.stats.decisions_none += 1;
        }

        let gated = self.hysteresis.gate(proposed, &self.state, now);
        if gated.debounced {
            self.stats.resume_debounced += 1;
        }
        let decision = gated.decision;
        debug!(
            command = ?decision.command,
            reason = %decision.reason,
            "decision"
        );

        let fault = self.injector.inject(decision.command, &decision.reason);
        if fault.flipped {
            self.stats.flips += 1;
        }
        if fault.dropped {
            self.stats.drops += 1;
        }
        self.stats.total_delay_s += fault.delay.as_secs_f64();

        self.console.frame(&stamp, &frame);

        let payload = map_to_payload(fault.final_command, decision.distance_used);
        let outcome = match payload {
            None => {
                self.console.no_tx(&stamp, &fault.reason);
                TxOutcome::NoCommand
            }
            Some(payload) => {
                self.stats.commands_attempted += 1;
                self.deliver(payload, &fault.reason, fault.dropped, fault.delay, &stamp, now)
                    .await
            }
        };

        let record = CycleRecord::from_cycle(
            stamp,
            &frame,
            decision.command,
            &fault,
            latency,
            outcome,
        );
        self.record(&record);
    }

    async fn deliver(
        &mut self,
        payload: CommandPayload,
        reason: &str,
        dropped: bool,
        delay: Duration,
        stamp: &str,
        now: Instant,
    ) -> TxOutcome {
        let mut send_at = now;
        if !delay.is_zero() {
            match self.config.delay_mode {
                DelayMode::Blocking => {
                    tokio::time::sleep(delay).await;
                    send_at = now + delay;
                }
                DelayMode::Scheduled if !dropped => {
                    self.schedule.push(now + delay, payload.clone(), reason);
                    self.stats.delays_scheduled += 1;
                    self.console.delayed(stamp, &payload, delay, reason);
                    return TxOutcome::Scheduled;
                }
                DelayMode::Scheduled => {}
            }
        }

        if dropped {
            self.console.no_tx(stamp, "dropped");
            return TxOutcome::Dropped;
        }

        self.dispatcher
            .transmit(
                &payload,
                reason,
                stamp,
                &mut self.state,
                &mut self.stats,
                send_at,
            )
            .await
    }

    // ── Records ─────────────────────────────────────────────────────────────

    fn record(&mut self, record: &CycleRecord) {
        if let Err(e) = self.recorder.record_cycle(record) {
            warn!(error = %e, "failed to write cycle record");
        }
    }

    /// Build the end-of-session summary from the current counters.
    pub fn summary(
        &self,
        session_id: &str,
        started: DateTime<Local>,
        ended: DateTime<Local>,
    ) -> SessionSummary {
        SessionSummary::new(session_id, started, ended, &self.config, &self.stats)
    }

    /// Append `summary` to the session logs; failures are logged only.
    pub fn record_summary(&mut self, summary: &SessionSummary) {
        if let Err(e) = self.recorder.record_summary(summary) {
            warn!(error = %e, "failed to append session summary");
        }
    }
}
