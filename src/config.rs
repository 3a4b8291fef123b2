//! # Configuration: the key→string table and its typed view.
//!
//! [`Settings`] is the raw configuration surface: a flat map of recognized
//! string keys, loadable from a YAML mapping or assembled in memory by the
//! storage collaborator. [`Config`] is the typed snapshot components consume;
//! it is derived once at startup and read on demand afterwards (changes take
//! effect on next derivation).
//!
//! ## Recognized keys
//! ```text
//! com_port              path     serial device path
//! baud_rate             int      default 38400
//! simulation_mode       bool     replace the serial sink with the simulated one
//! default_fade_time_ms  int      fade duration when a request omits fade_ms
//! default_intensity     0..255   intensity when a request omits it
//! ambient_enabled       bool     start ambient animation on logout
//! ambient_sequence_id   string   which sequence to run as ambient
//! login_fade_delay_ms   int      pause between floors during login fade-down
//! log_retention_days    int      audit log pruning horizon
//! ```
//!
//! Unknown keys are kept (forward compatibility for collaborators) but never
//! read by the core. Malformed values fall back to the documented default.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw key→string configuration table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Creates an empty table (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a YAML mapping of `key: value` pairs.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = io::BufReader::new(file);
        serde_yaml::from_reader(reader)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Builds a table from an iterator of pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a key, returning the table for chaining.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Raw string lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

/// Typed configuration snapshot consumed by the core components.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serial device path; `None` runs against the simulated sink only.
    pub com_port: Option<String>,
    /// Serial line speed. The bus runs 8-N-1 without flow control.
    pub baud_rate: u32,
    /// When set, the transport writes to the simulated sink instead of hardware.
    pub simulation_mode: bool,
    /// Fade duration applied when a request omits `fade_ms`.
    pub default_fade: Duration,
    /// Intensity applied when a request omits it and the state has no override.
    pub default_intensity: u8,
    /// Whether logout resumes the ambient sequence.
    pub ambient_enabled: bool,
    /// Which registered sequence runs as ambient.
    pub ambient_sequence_id: String,
    /// Pause between floors during the login fade-down.
    pub login_fade_delay: Duration,
    /// Audit retention horizon.
    pub log_retention: Duration,
    /// Opt-in last-level cache for fade planning (see resolver docs).
    pub track_levels: bool,
}

impl Config {
    /// Derives a typed snapshot from the raw table, filling defaults.
    pub fn from_settings(s: &Settings) -> Self {
        let d = Config::default();
        Self {
            com_port: s.get("com_port").map(str::to_string),
            baud_rate: s.get_parsed("baud_rate").unwrap_or(d.baud_rate),
            simulation_mode: s.get_bool("simulation_mode").unwrap_or(d.simulation_mode),
            default_fade: s
                .get_parsed("default_fade_time_ms")
                .map(Duration::from_millis)
                .unwrap_or(d.default_fade),
            default_intensity: s
                .get_parsed("default_intensity")
                .unwrap_or(d.default_intensity),
            ambient_enabled: s.get_bool("ambient_enabled").unwrap_or(d.ambient_enabled),
            ambient_sequence_id: s
                .get("ambient_sequence_id")
                .unwrap_or(&d.ambient_sequence_id)
                .to_string(),
            login_fade_delay: s
                .get_parsed("login_fade_delay_ms")
                .map(Duration::from_millis)
                .unwrap_or(d.login_fade_delay),
            log_retention: s
                .get_parsed::<u64>("log_retention_days")
                .map(|days| Duration::from_secs(days * 24 * 60 * 60))
                .unwrap_or(d.log_retention),
            track_levels: s.get_bool("track_levels").unwrap_or(d.track_levels),
        }
    }
}

impl Default for Config {
    /// Defaults match the installation's commissioning values:
    ///
    /// - `baud_rate = 38400`, 8-N-1, no flow control
    /// - `simulation_mode = false`
    /// - `default_fade = 1s`, `default_intensity = 255`
    /// - `ambient_enabled = true`, `ambient_sequence_id = "wave"`
    /// - `login_fade_delay = 100ms`
    /// - `log_retention = 30 days`
    fn default() -> Self {
        Self {
            com_port: None,
            baud_rate: 38_400,
            simulation_mode: false,
            default_fade: Duration::from_secs(1),
            default_intensity: 255,
            ambient_enabled: true,
            ambient_sequence_id: "wave".to_string(),
            login_fade_delay: Duration::from_millis(100),
            log_retention: Duration::from_secs(30 * 24 * 60 * 60),
            track_levels: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_view_parses_recognized_keys() {
        let s = Settings::from_pairs([
            ("com_port", "/dev/ttyUSB0"),
            ("baud_rate", "57600"),
            ("simulation_mode", "yes"),
            ("default_fade_time_ms", "750"),
            ("default_intensity", "200"),
            ("ambient_enabled", "false"),
            ("ambient_sequence_id", "chase"),
            ("login_fade_delay_ms", "250"),
            ("log_retention_days", "7"),
        ]);
        let c = Config::from_settings(&s);
        assert_eq!(c.com_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(c.baud_rate, 57_600);
        assert!(c.simulation_mode);
        assert_eq!(c.default_fade, Duration::from_millis(750));
        assert_eq!(c.default_intensity, 200);
        assert!(!c.ambient_enabled);
        assert_eq!(c.ambient_sequence_id, "chase");
        assert_eq!(c.login_fade_delay, Duration::from_millis(250));
        assert_eq!(c.log_retention, Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let s = Settings::from_pairs([
            ("baud_rate", "fast"),
            ("default_intensity", "-3"),
            ("ambient_enabled", "maybe"),
        ]);
        let c = Config::from_settings(&s);
        assert_eq!(c.baud_rate, 38_400);
        assert_eq!(c.default_intensity, 255);
        assert!(c.ambient_enabled);
    }

    #[test]
    fn unknown_keys_are_kept_but_ignored() {
        let s = Settings::new().with("dashboard_theme", "dark");
        assert_eq!(s.get("dashboard_theme"), Some("dark"));
        let c = Config::from_settings(&s);
        assert_eq!(c.baud_rate, 38_400);
    }
}
