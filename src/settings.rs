//! Runtime settings of a survey session

use serde::Deserialize;
use time::Duration;

/// Tunables that are not part of a survey protocol.
///
/// Every field has a default, so an empty YAML document is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Settings {
    /// Fixes older than this (relative to the clock) are dropped
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,
    /// Fixes this close to the previous fix are treated as the same instant
    #[serde(default)]
    pub duplicate_tolerance_ms: u64,
    /// Window used to find the GPS point matching a map touch timestamp
    #[serde(default = "default_match_window")]
    pub observer_match_window_ms: u64,
    /// Keep logging while the app is in the background
    #[serde(default)]
    pub background_track_logging: bool,
}

fn default_stale_after() -> u64 {
    1000
}

fn default_match_window() -> u64 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stale_after_ms: default_stale_after(),
            duplicate_tolerance_ms: 0,
            observer_match_window_ms: default_match_window(),
            background_track_logging: false,
        }
    }
}

impl Settings {
    pub fn stale_after(&self) -> Duration {
        Duration::milliseconds(self.stale_after_ms as i64)
    }

    pub fn duplicate_tolerance(&self) -> Duration {
        Duration::milliseconds(self.duplicate_tolerance_ms as i64)
    }

    pub fn observer_match_window(&self) -> Duration {
        Duration::milliseconds(self.observer_match_window_ms as i64)
    }
}

#[test]
fn parse_settings() -> Result<(), String> {
    let settings: Settings = serde_yaml::from_str("{}").map_err(|e| e.to_string())?;
    assert_eq!(Settings::default(), settings);

    let yaml = "stale_after_ms: 2500\nbackground_track_logging: true";
    let settings: Settings = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
    assert_eq!(2500, settings.stale_after_ms);
    assert_eq!(Duration::milliseconds(2500), settings.stale_after());
    assert!(settings.background_track_logging);
    assert_eq!(1, settings.observer_match_window_ms);

    Ok(())
}
