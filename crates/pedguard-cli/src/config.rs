//! Configuration loading: defaults, then an optional TOML file, then
//! environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pedguard_types::{DelayMode, GuardConfig, GuardError, Verbosity};
use tracing::warn;

/// Where the base configuration came from (environment overrides apply on
/// top of either).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// `PEDGUARD_CONFIG` if set, else `~/.pedguard/config.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var("PEDGUARD_CONFIG") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => config_path_for_home(&home_dir()),
    }
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pedguard").join("config.toml")
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    expand_home_with(path, &home_dir())
}

pub(crate) fn expand_home_with(path: &str, home: &str) -> PathBuf {
    if path == "~" {
        PathBuf::from(home)
    } else if let Some(rest) = path.strip_prefix("~/") {
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Resolve the effective configuration.
pub fn load() -> Result<(GuardConfig, ConfigSource), GuardError> {
    let path = config_path();
    let (mut cfg, source) = match load_from(&path)? {
        Some(cfg) => (cfg, ConfigSource::File(path)),
        None => (GuardConfig::default(), ConfigSource::Defaults),
    };
    apply_env_overrides(&mut cfg);
    Ok((cfg, source))
}

/// Parse a TOML file.  `Ok(None)` when the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<GuardConfig>, GuardError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| GuardError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| GuardError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable(s) | Field |
/// |---|---|
/// | `VM_IP`, `CTRL_LISTEN_IP` | `listen_ip` |
/// | `VM_PORT`, `CTRL_LISTEN_PORT` | `listen_port` |
/// | `CARLA_IP` / `CARLA_PORT` | `peer_ip` / `peer_port` |
/// | `BRAKE_RANGE_M`, `BRAKE_M` | `brake_range_m` |
/// | `SLOWDOWN_START_M` | `slowdown_start_m` |
/// | `FLIP_PROB`, `DROP_PROB`, `DELAY_MIN`, `DELAY_MAX` | `faults.*` |
/// | `COOLDOWN_S`, `STALE_TIMEOUT_S`, `MIN_BRAKE_HOLD_S` | timing |
/// | `NO_PED_FRAMES` | `no_ped_frames` |
/// | `SAFE_MODE` | `safe_mode` (`1` ⇒ on, anything else ⇒ off) |
/// | `VERBOSITY`, `DELAY_MODE`, `LOG_DIR` | output |
/// | `POLL_INTERVAL_MS`, `MAX_DRAIN` | polling |
///
/// Where several names are listed, the first one that is set and parses
/// wins.  Values that do not parse are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut GuardConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides<F>(cfg: &mut GuardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Overrides { lookup };

    env.text(&["VM_IP", "CTRL_LISTEN_IP"], &mut cfg.listen_ip);
    env.parsed(&["VM_PORT", "CTRL_LISTEN_PORT"], &mut cfg.listen_port);
    env.text(&["CARLA_IP"], &mut cfg.peer_ip);
    env.parsed(&["CARLA_PORT"], &mut cfg.peer_port);

    env.parsed(&["SLOWDOWN_START_M"], &mut cfg.slowdown_start_m);
    env.parsed(&["BRAKE_RANGE_M", "BRAKE_M"], &mut cfg.brake_range_m);

    env.parsed(&["FLIP_PROB"], &mut cfg.faults.flip_prob);
    env.parsed(&["DROP_PROB"], &mut cfg.faults.drop_prob);
    env.parsed(&["DELAY_MIN"], &mut cfg.faults.delay_min_s);
    env.parsed(&["DELAY_MAX"], &mut cfg.faults.delay_max_s);

    env.parsed(&["COOLDOWN_S"], &mut cfg.cooldown_s);
    env.parsed(&["STALE_TIMEOUT_S"], &mut cfg.stale_timeout_s);
    env.parsed(&["NO_PED_FRAMES"], &mut cfg.no_ped_frames);
    env.parsed(&["MIN_BRAKE_HOLD_S"], &mut cfg.min_brake_hold_s);

    if let Some(v) = env.first(&["SAFE_MODE"]) {
        cfg.safe_mode = v.trim() == "1";
    }
    env.parsed::<Verbosity>(&["VERBOSITY"], &mut cfg.verbosity);
    env.parsed::<DelayMode>(&["DELAY_MODE"], &mut cfg.delay_mode);
    env.text(&["LOG_DIR"], &mut cfg.log_dir);

    env.parsed(&["POLL_INTERVAL_MS"], &mut cfg.poll_interval_ms);
    env.parsed(&["MAX_DRAIN"], &mut cfg.max_drain);
}

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| (self.lookup)(k))
    }

    fn text(&self, keys: &[&str], slot: &mut String) {
        if let Some(v) = self.first(keys) {
            *slot = v;
        }
    }

    fn parsed<T: FromStr>(&self, keys: &[&str], slot: &mut T) {
        for key in keys {
            let Some(raw) = (self.lookup)(key) else {
                continue;
            };
            match raw.trim().parse::<T>() {
                Ok(v) => {
                    *slot = v;
                    return;
                }
                Err(_) => warn!(key, value = %raw, "ignoring unparseable environment override"),
            }
        }
    }
}
