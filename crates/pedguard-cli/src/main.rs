//! `pedguard` – pedestrian safety controller.
//!
//! This binary:
//!
//! 1. Initialises tracing and resolves the configuration (defaults, then
//!    `~/.pedguard/config.toml` or `PEDGUARD_CONFIG`, then environment).
//! 2. Opens the CSV and JSON-lines session logs and prints the banner.
//! 3. Intercepts **Ctrl-C** to stop the control loop between iterations.
//! 4. Runs the control loop on a current-thread Tokio runtime, then prints
//!    the session summary and appends it to both logs.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use colored::Colorize;
use pedguard_kernel::RngEntropy;
use pedguard_middleware::{UdpCommandSink, UdpTelemetrySource};
use pedguard_recorder::{SessionRecorder, SessionSummary, session_id};
use pedguard_runtime::{ControlLoop, init_tracing};
use pedguard_types::{GuardConfig, GuardError, Verbosity};
use tracing::{error, info, warn};

use crate::config::ConfigSource;

fn main() -> ExitCode {
    let _tracing = init_tracing("pedguard");

    // ── Configuration ─────────────────────────────────────────────────────
    let (cfg, source) = match config::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            println!("  Using default configuration.");
            let mut cfg = GuardConfig::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, ConfigSource::Defaults)
        }
    };

    // ── Session logs ──────────────────────────────────────────────────────
    let started = Local::now();
    let session = session_id(started);
    let log_dir = config::expand_home(&cfg.log_dir);
    let recorder = match SessionRecorder::create(&log_dir, &session) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!(dir = %log_dir.display(), error = %e, "cannot open session logs");
            eprintln!("{} cannot open logs in {}: {e}", "[FATAL]".red().bold(), log_dir.display());
            return ExitCode::FAILURE;
        }
    };
    let log_paths = (
        recorder.csv_path().to_path_buf(),
        recorder.json_path().to_path_buf(),
    );

    if cfg.verbosity != Verbosity::Quiet {
        print_banner(&cfg, &source, &log_paths);
    }

    // ── Ctrl-C ────────────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received, stopping after the current cycle".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; interrupt will not shut down gracefully");
    }

    // ── Control loop ──────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} cannot start runtime: {e}", "[FATAL]".red().bold());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, recorder, shutdown, &session, started)) {
        Ok(summary) => {
            print_summary(&summary, &log_paths);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "controller failed to start");
            eprintln!("{} {e}", "[FATAL]".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cfg: GuardConfig,
    recorder: SessionRecorder,
    shutdown: Arc<AtomicBool>,
    session: &str,
    started: DateTime<Local>,
) -> Result<SessionSummary, GuardError> {
    let source = UdpTelemetrySource::bind(&cfg.listen_addr(), cfg.max_drain).await?;
    let sink = UdpCommandSink::connect(&cfg.peer_addr()).await?;
    info!(
        listen = %cfg.listen_addr(),
        peer = %sink.peer(),
        session,
        "sockets ready"
    );

    let mut control = ControlLoop::new(
        cfg,
        Box::new(source),
        Box::new(sink),
        Box::new(recorder),
        Box::new(RngEntropy::from_os()),
    );
    control.run(shutdown).await;

    let summary = control.summary(session, started, Local::now());
    control.record_summary(&summary);
    Ok(summary)
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner & summary
// ─────────────────────────────────────────────────────────────────────────────

fn on_off(flag: bool) -> colored::ColoredString {
    if flag { "ON".green().bold() } else { "OFF".red().bold() }
}

fn print_banner(cfg: &GuardConfig, source: &ConfigSource, logs: &(PathBuf, PathBuf)) {
    println!();
    println!("  {} {}",
        "PedGuard".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pedestrian safety controller");
    println!();
    match source {
        ConfigSource::File(path) => println!("  Config loaded from {}", path.display().to_string().bold()),
        ConfigSource::Defaults => println!("  Config: {}", "defaults + environment".dimmed()),
    }
    println!("  Listening on        {}", cfg.listen_addr().bold());
    println!("  Sending commands to {}", cfg.peer_addr().bold());
    println!("  Logging to:");
    println!("    CSV:  {}", logs.0.display());
    println!("    JSON: {}", logs.1.display());
    println!(
        "  Safety override {} | verbosity={} | delay mode={}",
        on_off(cfg.safe_mode),
        cfg.verbosity,
        cfg.delay_mode
    );
    println!(
        "  Thresholds: slowdown_start={}m | brake_range={}m | slowdown {}",
        cfg.slowdown_start_m,
        cfg.brake_range_m,
        on_off(cfg.slowdown_enabled())
    );
    println!(
        "  cooldown={}s | stale_timeout={}s | no_ped_frames={} | min_brake_hold={}s",
        cfg.cooldown_s, cfg.stale_timeout_s, cfg.no_ped_frames, cfg.min_brake_hold_s
    );
    let faults = cfg.effective_faults();
    let (low, high) = faults.delay_range();
    println!(
        "  Faults: flip={} | drop={} | delay={}..{}s",
        faults.flip_prob, faults.drop_prob, low, high
    );
    println!();
}

fn print_summary(summary: &SessionSummary, logs: &(PathBuf, PathBuf)) {
    println!();
    println!("{}", "=== SESSION SUMMARY ===".bold());
    println!("session_id: {}", summary.session_id);
    println!("duration_s: {:.3}", summary.duration_s);
    for (key, value) in summary.stats.entries() {
        println!("{key}: {value}");
    }
    println!("Logs: {}  |  {}", logs.0.display(), logs.1.display());
}
