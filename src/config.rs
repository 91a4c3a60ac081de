//! Persisted preferences, stored as TOML in the user config directory.
//! Anything unreadable degrades to defaults rather than failing the app.

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::counter::{CounterOptionOverrides, YDisplay, YRange, YRounding};
use crate::time::TimestampFormat;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timestamp_format: TimestampFormat,
    pub counter: CounterConfig,
}

/// Counter defaults applied to every counter track. Per-track overrides
/// (unit, sharing key) still win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub y_rounding: YRounding,
    pub y_display: YDisplay,
    pub y_range: YRange,
}

impl CounterConfig {
    pub fn to_overrides(&self) -> CounterOptionOverrides {
        CounterOptionOverrides {
            y_rounding: Some(self.y_rounding),
            y_display: Some(self.y_display),
            y_range: Some(self.y_range),
            ..CounterOptionOverrides::default()
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("traceline").join("config.toml"))
}

pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(_) => return Config::default(),
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring malformed config {path:?}: {e}");
            Config::default()
        }
    }
}

pub fn save(config: &Config) {
    let Some(path) = config_path() else {
        return;
    };
    let contents = match toml::to_string_pretty(config) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("could not serialize config: {e}");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("could not create config directory {parent:?}: {e}");
            return;
        }
    }
    if let Err(e) = std::fs::write(&path, contents) {
        warn!("could not write config {path:?}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config {
            timestamp_format: TimestampFormat::Seconds,
            counter: CounterConfig {
                y_rounding: YRounding::Strict,
                y_display: YDisplay::MinMax,
                y_range: YRange::Viewport,
            },
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("timestamp_format = \"raw\"\n").unwrap();
        assert_eq!(parsed.timestamp_format, TimestampFormat::Raw);
        assert_eq!(parsed.counter, CounterConfig::default());
    }
}
