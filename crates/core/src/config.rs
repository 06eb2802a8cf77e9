//! YAML configuration: rates, check interval, the watched game lists, and
//! the result of the last Steam scan.

use crate::device::PollingRate;
use crate::error::{Error, Result};
use crate::steam::{Library, ScanReport};
use crate::watcher::WatcherSettings;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// A Steam scan younger than this is not repeated unless forced.
pub const STEAM_RESCAN_AFTER_HOURS: i64 = 24;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rate applied while no watched game is running.
    #[serde(default = "default_polling_rate")]
    pub default_polling_rate: u32,
    /// Rate applied while any watched game is running.
    #[serde(default = "game_polling_rate")]
    pub game_polling_rate: u32,
    /// Time between process checks, e.g. `2s` or `500ms`.
    #[serde(default = "check_interval", with = "duration_str")]
    pub check_interval: Duration,
    /// Plain executable names.
    #[serde(default = "default_games")]
    pub games: Vec<String>,
    /// Games added by hand with `add-game`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_games: Vec<CustomGame>,
    /// Games found by `scan-steam`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_games: Vec<DetectedGame>,
    /// Where the last Steam scan looked, and when.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam: Option<SteamSection>,
    /// Keys this version does not know about, kept across load/save.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomGame {
    pub name: String,
    pub executable: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedGame {
    pub name: String,
    pub executable: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub install_path: String,
    /// Label of the library the game was found in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub library: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size_mb: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteamSection {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub install_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// How many entries each game list holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameCounts {
    pub detected: usize,
    pub custom: usize,
    pub legacy: usize,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn default_polling_rate() -> u32 {
    1000
}

fn game_polling_rate() -> u32 {
    2000
}

fn check_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_games() -> Vec<String> {
    [
        "HuntGame.exe",
        "DuneSandbox-Wi.exe",
        "eldenring.exe",
        "cs2.exe",
        "valorant.exe",
        "ApexLegends.exe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_polling_rate: default_polling_rate(),
            game_polling_rate: game_polling_rate(),
            check_interval: check_interval(),
            games: default_games(),
            custom_games: Vec::new(),
            detected_games: Vec::new(),
            steam: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load the config, writing the defaults to `path` if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                info!(path = %path.display(), "Created default config file");
                return Ok(config);
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        debug!(path = %path.display(), games = config.watched_games().len(), "Config loaded");
        Ok(config)
    }

    /// Write the config atomically (temporary file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".config-")
            .suffix(".yaml.tmp")
            .tempfile_in(dir)?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check that both rates are supported and the interval is non-zero.
    pub fn validate(&self) -> Result<()> {
        for (field, hz) in [
            ("default_polling_rate", self.default_polling_rate),
            ("game_polling_rate", self.game_polling_rate),
        ] {
            if PollingRate::from_hz(hz).is_none() {
                return Err(Error::Config(format!(
                    "{field} = {hz} is not a supported rate (valid: 500, 1000, 2000, 4000, 8000)"
                )));
            }
        }
        if self.check_interval.is_zero() {
            return Err(Error::Config("check_interval must be greater than zero".into()));
        }
        Ok(())
    }

    /// Every executable to watch, without case-insensitive duplicates.
    pub fn watched_games(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.games
            .iter()
            .chain(self.custom_games.iter().map(|g| &g.executable))
            .chain(self.detected_games.iter().map(|g| &g.executable))
            .filter(|exe| !exe.trim().is_empty())
            .filter(|exe| seen.insert(exe.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Validated settings for the game watcher.
    pub fn watcher_settings(&self) -> Result<WatcherSettings> {
        self.validate()?;
        Ok(WatcherSettings {
            default_rate: PollingRate::try_from_hz(self.default_polling_rate)?,
            game_rate: PollingRate::try_from_hz(self.game_polling_rate)?,
            interval: self.check_interval,
            games: self.watched_games(),
        })
    }

    /// Add a custom game. Fails if a custom game already uses `executable`.
    pub fn add_custom_game(&mut self, name: &str, executable: &str, path: &str) -> Result<()> {
        if self
            .custom_games
            .iter()
            .any(|g| g.executable.eq_ignore_ascii_case(executable))
        {
            return Err(Error::Config(format!(
                "game with executable '{executable}' already exists"
            )));
        }
        self.custom_games.push(CustomGame {
            name: name.to_string(),
            executable: executable.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    /// Remove a custom game by name (case-insensitive).
    pub fn remove_custom_game(&mut self, name: &str) -> Result<CustomGame> {
        let index = self
            .custom_games
            .iter()
            .position(|g| g.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Config(format!("custom game '{name}' not found")))?;
        Ok(self.custom_games.remove(index))
    }

    pub fn game_counts(&self) -> GameCounts {
        GameCounts {
            detected: self.detected_games.len(),
            custom: self.custom_games.len(),
            legacy: self.games.len(),
        }
    }

    /// Install path saved by the last scan, if any.
    pub fn steam_install_path(&self) -> Option<&Path> {
        self.steam
            .as_ref()
            .map(|s| Path::new(s.install_path.as_str()))
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn last_steam_scan(&self) -> Option<DateTime<Utc>> {
        self.steam.as_ref().and_then(|s| s.last_scan)
    }

    /// Whether the last Steam scan ran less than a day before `now`.
    pub fn steam_scan_is_recent(&self, now: DateTime<Utc>) -> bool {
        self.last_steam_scan()
            .is_some_and(|last| now - last < TimeDelta::hours(STEAM_RESCAN_AFTER_HOURS))
    }

    /// Fold a Steam scan into the config.
    ///
    /// Scanned games replace detected games with the same app id. Previously
    /// detected games the scan did not report are kept while their install
    /// folder still exists. Plain `games` entries are moved into
    /// `custom_games` the first time, when no custom games exist yet.
    pub fn apply_steam_scan(&mut self, report: &ScanReport, now: DateTime<Utc>) {
        let mut previous = std::mem::take(&mut self.detected_games);
        let mut detected = Vec::with_capacity(report.games.len());
        for game in &report.games {
            let mut game = game.clone();
            let same_app = previous
                .iter()
                .position(|old| !old.app_id.is_empty() && old.app_id == game.app_id);
            if let Some(i) = same_app {
                game.extra = previous.swap_remove(i).extra;
            }
            detected.push(game);
        }

        previous.retain(|g| !g.install_path.is_empty() && Path::new(&g.install_path).is_dir());
        previous.sort_by_key(|g| g.name.to_lowercase());
        detected.extend(previous);
        self.detected_games = detected;

        if self.custom_games.is_empty() && !self.games.is_empty() {
            let converted = self.games.len();
            self.custom_games = self
                .games
                .drain(..)
                .filter(|exe| !exe.trim().is_empty())
                .map(|exe| CustomGame {
                    name: display_name(&exe),
                    executable: exe,
                    path: String::new(),
                })
                .collect();
            info!(count = converted, "Moved plain game list into custom games");
        }

        let extra = self.steam.take().map(|s| s.extra).unwrap_or_default();
        self.steam = Some(SteamSection {
            install_path: report.install_path.display().to_string(),
            libraries: report.libraries.clone(),
            last_scan: Some(now),
            extra,
        });
    }
}

/// `"elden_ring.exe"` → `"Elden Ring"`.
fn display_name(executable: &str) -> String {
    let stem = executable
        .len()
        .checked_sub(4)
        .filter(|&i| executable.get(i..).is_some_and(|ext| ext.eq_ignore_ascii_case(".exe")))
        .map_or(executable, |i| &executable[..i]);
    stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Parse a duration such as `2s`, `500ms`, `1m30s`, or `1.5s`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let text = text.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration '{text}': expected a number"));
        }
        let (num, tail) = rest.split_at(num_len);
        let value: f64 = num
            .parse()
            .map_err(|_| format!("invalid duration '{text}': bad number '{num}'"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("invalid duration '{text}': missing unit")),
            other => return Err(format!("invalid duration '{text}': unknown unit '{other}'")),
        };
        total_nanos += value * nanos_per_unit;
        rest = next;
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(format!("invalid duration '{text}': out of range"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Format a duration the way [`parse_duration`] reads it, e.g. `1m30s`.
/// Sub-millisecond parts are kept by falling back to `us` or `ns`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos % 1_000_000 != 0 {
        return if nanos % 1_000 == 0 {
            format!("{}us", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let total_ms = d.as_millis();
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let sec_ms = total_ms % 60_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if sec_ms % 1000 == 0 {
        out.push_str(&format!("{}s", sec_ms / 1000));
    } else {
        let frac = format!("{:03}", sec_ms % 1000);
        out.push_str(&format!("{}.{}s", sec_ms / 1000, frac.trim_end_matches('0')));
    }
    out
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
