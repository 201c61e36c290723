//! Loading: compiled defaults, the JSON settings file merged over them,
//! `RELAY_*` environment overrides on top, then validation.

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{BackendKind, RelaySettings};

/// `~/.relay/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".relay")
        .join("settings.json")
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, then the file at `path` when present, then `RELAY_*` variables.
///
/// A missing file is not an error; unreadable or malformed JSON is, and so
/// is a merged result that fails [`RelaySettings::validate`].
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let mut merged = serde_json::to_value(RelaySettings::default())?;
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!(path = %path.display(), "merging settings file");
            merge_into(&mut merged, serde_json::from_str(&text)?);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, compiled defaults apply");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_value(merged)?)
}

/// Merge `overlay` over `base` and return the result.
///
/// Objects merge key by key. Any other overlay value replaces the base value
/// outright (arrays included). `null` in the overlay leaves the base untouched.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `RELAY_*` environment overrides.
///
/// Values that do not parse, or fall outside their allowed range, are logged
/// and skipped so the file or default value stays in effect.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// [`apply_env_overrides`] over any variable lookup.
fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("RELAY_PORT", 0..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.number("RELAY_MAX_CONNECTIONS", 1..=100_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.bool("RELAY_MULTI_TURN") {
        settings.server.multi_turn = v;
    }

    // ── Agent ───────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_BACKEND") {
        match BackendKind::parse(&v) {
            Some(kind) => settings.agent.backend = kind,
            None => warn!(key = "RELAY_BACKEND", value = %v, "ignoring unknown backend"),
        }
    }
    if let Some(v) = env.string("RELAY_MODEL") {
        settings.agent.model = v;
    }
    if let Some(v) = env.number("RELAY_MAX_TURNS", 1..=1000) {
        settings.agent.max_turns = v;
    }
    if let Some(v) = env.string("RELAY_BASE_URL") {
        settings.agent.base_url = Some(v);
    }

    // ── Permissions ─────────────────────────────────────────────────
    if let Some(v) = env.number("RELAY_PERMISSION_TIMEOUT_SECS", 1..=3600) {
        settings.permissions.timeout_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RELAY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Value parsing ───────────────────────────────────────────────────────────

/// Parse a switch value: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// case-insensitively.
pub fn parse_bool(val: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim();
    if ON.iter().any(|v| v.eq_ignore_ascii_case(val)) {
        Some(true)
    } else if OFF.iter().any(|v| v.eq_ignore_ascii_case(val)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and keep it only when it falls inside `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

// ── Variable source ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    /// Non-empty string value.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = (self.lookup)(name)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            warn!(key = name, value = %raw, "ignoring invalid override");
        }
        parsed
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, parse_bool)
    }

    fn number<T: FromStr + PartialOrd>(&self, name: &str, range: RangeInclusive<T>) -> Option<T> {
        self.parsed(name, |v| parse_in_range(v, range))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
