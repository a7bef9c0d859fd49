//! Monitor configuration snapshots and field-wise overlays.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default interval between polls of a watched path.
pub const DEFAULT_POLLING_RATE: Duration = Duration::from_millis(500);

/// Default dropins directory, resolved against the server directory.
pub const DEFAULT_DROPINS_LOCATION: &str = "dropins";

/// How change detection is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    /// Watched paths are scanned every polling interval.
    #[default]
    Polled,
    /// Watched paths are scanned only when an external trigger asks for it.
    Mbean,
    /// No change detection at all.
    Disabled,
}

impl TriggerMode {
    /// Returns true unless the mode is [`TriggerMode::Disabled`].
    pub fn is_enabled(self) -> bool {
        self != TriggerMode::Disabled
    }
}

impl FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polled" => Ok(TriggerMode::Polled),
            "mbean" => Ok(TriggerMode::Mbean),
            "disabled" => Ok(TriggerMode::Disabled),
            other => Err(format!(
                "unknown update trigger '{}', expected polled, mbean or disabled",
                other
            )),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerMode::Polled => "polled",
            TriggerMode::Mbean => "mbean",
            TriggerMode::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for TriggerMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An immutable snapshot of the monitor configuration.
///
/// Snapshots are never mutated; a reconfiguration builds a new one with
/// [`MonitorConfig::overlay`] and swaps it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Interval between polls of each watched path.
    pub polling_rate: Duration,
    /// Location of the dropins directory, possibly symbolic or relative.
    pub dropins_location: String,
    /// How change detection is triggered.
    pub trigger_mode: TriggerMode,
    /// Whether the dropins directory is monitored at all.
    pub dropins_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            polling_rate: DEFAULT_POLLING_RATE,
            dropins_location: DEFAULT_DROPINS_LOCATION.to_string(),
            trigger_mode: TriggerMode::Polled,
            dropins_enabled: true,
        }
    }
}

impl MonitorConfig {
    /// Build a snapshot by laying the fields present in `update` over `previous`.
    ///
    /// A field missing from `update` keeps its previous value, or the built-in
    /// default when there is no previous snapshot.
    pub fn overlay(previous: Option<&MonitorConfig>, update: &MonitorConfigUpdate) -> Self {
        let base = previous.cloned().unwrap_or_default();
        Self {
            polling_rate: update.polling_rate.unwrap_or(base.polling_rate),
            dropins_location: update
                .dropins_location
                .clone()
                .unwrap_or(base.dropins_location),
            trigger_mode: update.trigger_mode.unwrap_or(base.trigger_mode),
            dropins_enabled: update.dropins_enabled.unwrap_or(base.dropins_enabled),
        }
    }

    /// Returns true when dropins should be actively watched.
    pub fn watches_dropins(&self) -> bool {
        self.dropins_enabled && self.trigger_mode.is_enabled()
    }
}

/// A partial configuration as supplied by the host on (re)configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MonitorConfigUpdate {
    /// Polling interval; integer milliseconds or a string such as `"2s"`.
    #[serde(
        default,
        rename = "pollingRate",
        alias = "pollingrate",
        alias = "polling_rate",
        deserialize_with = "deserialize_polling_rate"
    )]
    pub polling_rate: Option<Duration>,

    /// Dropins directory location.
    #[serde(default, rename = "dropins", alias = "dropins_location")]
    pub dropins_location: Option<String>,

    /// Trigger mode (`polled`, `mbean` or `disabled`).
    #[serde(
        default,
        rename = "updateTrigger",
        alias = "updatetrigger",
        alias = "update_trigger"
    )]
    pub trigger_mode: Option<TriggerMode>,

    /// Whether dropins are monitored.
    #[serde(
        default,
        rename = "dropinsEnabled",
        alias = "dropinsenabled",
        alias = "dropins_enabled"
    )]
    pub dropins_enabled: Option<bool>,
}

impl MonitorConfigUpdate {
    /// Create an empty update; overlaying it changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval.
    pub fn with_polling_rate(mut self, rate: Duration) -> Self {
        self.polling_rate = Some(rate);
        self
    }

    /// Set the dropins location.
    pub fn with_dropins_location(mut self, location: impl Into<String>) -> Self {
        self.dropins_location = Some(location.into());
        self
    }

    /// Set the trigger mode.
    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = Some(mode);
        self
    }

    /// Enable or disable dropins monitoring.
    pub fn with_dropins_enabled(mut self, enabled: bool) -> Self {
        self.dropins_enabled = Some(enabled);
        self
    }

    /// Returns true if no field is present.
    pub fn is_empty(&self) -> bool {
        self.polling_rate.is_none()
            && self.dropins_location.is_none()
            && self.trigger_mode.is_none()
            && self.dropins_enabled.is_none()
    }
}

/// Parse a polling interval such as `500`, `"500ms"`, `"2s"`, `"1m"` or `"1h"`.
///
/// A bare number is taken as milliseconds.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", text))?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, text)),
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range '{}'", text))
}

fn deserialize_polling_rate<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
        Some(Raw::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
