//! Runtime configuration.
//!
//! Values come from the process environment (after `.env` has been loaded)
//! and fall back to the defaults below. The stop list is either the
//! built-in one or a JSON file named by `STOPS_FILE`:
//!
//! ```json
//! [
//!   { "label": "From home" },
//!   { "label": "52 to Forest Hill", "stopId": 14366 },
//!   { "label": "52 from Glen Park", "stopId": 14388, "line": "52" }
//! ]
//! ```

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::normalizer::DEFAULT_MAX_ARRIVALS;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AGENCY: &str = "SF";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.511.org/transit/StopMonitoring";
pub const DEFAULT_DISPLAY_TZ: &str = "America/Los_Angeles";

/// One entry of the arrival board. Entries without a `stop_id` are section
/// headers and are never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopConfig {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
}

impl StopConfig {
    pub fn header(label: &str) -> Self {
        Self {
            label: label.to_string(),
            stop_id: None,
            line: None,
        }
    }

    pub fn stop(label: &str, stop_id: u32, line: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            stop_id: Some(stop_id),
            line: line.map(str::to_string),
        }
    }

    pub fn is_header(&self) -> bool {
        self.stop_id.is_none()
    }

    /// Identifies the stop on the board. Two entries may share a stop id
    /// with different line filters, so the filter is part of the key.
    pub fn key(&self) -> String {
        format!(
            "{}-{}",
            self.stop_id.map(|id| id.to_string()).unwrap_or_default(),
            self.line.as_deref().unwrap_or("")
        )
    }
}

/// The stops shown when no `STOPS_FILE` is configured.
pub fn default_stops() -> Vec<StopConfig> {
    vec![
        StopConfig::header("From home"),
        StopConfig::stop("52 to Forest Hill", 14366, None),
        StopConfig::stop("52 to Glen Park", 14455, None),
        StopConfig::header("From work going home"),
        StopConfig::stop("Folsom & Embarcadero going west", 14510, None),
        StopConfig::header("From nearby muni stations to home"),
        StopConfig::stop("52 from Glen Park", 14388, Some("52")),
        StopConfig::stop("52 from Forest Hill", 15247, Some("52")),
    ]
}

/// Loads a stop list from a JSON file at `path`.
pub fn load_stops(path: &str) -> Result<Vec<StopConfig>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading stops file '{path}'"))?;
    let stops: Vec<StopConfig> =
        serde_json::from_str(&content).with_context(|| format!("parsing stops file '{path}'"))?;
    Ok(stops)
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream secret. `None` leaves the proxy running but every transit
    /// request fails with a configuration error.
    pub api_key: Option<String>,
    pub port: u16,
    pub agency: String,
    pub refresh_interval: Duration,
    pub max_arrivals: usize,
    pub upstream_url: String,
    pub display_tz: Tz,
    pub stops: Vec<StopConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            port: DEFAULT_PORT,
            agency: DEFAULT_AGENCY.to_string(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            max_arrivals: DEFAULT_MAX_ARRIVALS,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            display_tz: chrono_tz::America::Los_Angeles,
            stops: default_stops(),
        }
    }
}

/// The settings that shape a normalized arrival list. Loadable on its own
/// so that one-off normalization does not depend on the rest of the
/// server configuration being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub max_arrivals: usize,
    pub display_tz: Tz,
}

impl FeedSettings {
    /// Reads `MAX_ARRIVALS` and `DISPLAY_TZ` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_var)
    }

    fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            max_arrivals: parse_or(get, "MAX_ARRIVALS", DEFAULT_MAX_ARRIVALS)?,
            display_tz: parse_tz(
                &get("DISPLAY_TZ").unwrap_or_else(|| DEFAULT_DISPLAY_TZ.to_string()),
            )?,
        })
    }
}

impl Config {
    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_var)
    }

    fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = get("API_KEY").filter(|k| !k.trim().is_empty());
        let stops = match get("STOPS_FILE") {
            Some(path) => load_stops(&path)?,
            None => default_stops(),
        };
        let feed = FeedSettings::from_lookup(get)?;

        Ok(Self {
            api_key,
            port: parse_or(get, "PORT", DEFAULT_PORT)?,
            agency: get("AGENCY").unwrap_or_else(|| DEFAULT_AGENCY.to_string()),
            refresh_interval: Duration::from_millis(parse_or(
                get,
                "REFRESH_INTERVAL_MS",
                DEFAULT_REFRESH_INTERVAL_MS,
            )?),
            max_arrivals: feed.max_arrivals,
            upstream_url: get("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            display_tz: feed.display_tz,
            stops,
        })
    }

    /// Stops that are fetched, in board order.
    pub fn fetchable_stops(&self) -> impl Iterator<Item = &StopConfig> {
        self.stops.iter().filter(|s| !s.is_header())
    }
}

pub fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow!("invalid DISPLAY_TZ '{name}': {e}"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_or<T>(get: &dyn Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {name} '{raw}': {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_default_stops_have_three_headers() {
        let stops = default_stops();
        assert_eq!(stops.len(), 8);
        assert_eq!(stops.iter().filter(|s| s.is_header()).count(), 3);
        assert_eq!(
            stops.iter().filter(|s| s.line.as_deref() == Some("52")).count(),
            2
        );
    }

    #[test]
    fn test_stop_key_includes_line() {
        assert_eq!(StopConfig::stop("a", 14388, Some("52")).key(), "14388-52");
        assert_eq!(StopConfig::stop("b", 14388, None).key(), "14388-");
    }

    #[test]
    fn test_load_stops_from_json() {
        let path = format!("{}/transit_monitor_test_stops.json", env::temp_dir().display());
        fs::write(
            &path,
            r#"[{"label":"Home"},{"label":"52 inbound","stopId":14366,"line":"52"}]"#,
        )
        .unwrap();

        let stops = load_stops(&path).unwrap();
        assert_eq!(
            stops,
            vec![
                StopConfig::header("Home"),
                StopConfig::stop("52 inbound", 14366, Some("52")),
            ]
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_stops_missing_file() {
        assert!(load_stops("/nonexistent/transit_monitor_stops.json").is_err());
    }

    #[test]
    fn test_parse_tz() {
        assert_eq!(parse_tz("Europe/Paris").unwrap(), chrono_tz::Europe::Paris);
        assert!(parse_tz("Mars/Olympus").is_err());
    }

    #[test]
    fn test_fetchable_stops_skip_headers() {
        let config = Config::default();
        assert_eq!(config.fetchable_stops().count(), 5);
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_config_from_lookup() {
        let config = Config::from_lookup(&lookup(&[
            ("API_KEY", "abc"),
            ("PORT", "8080"),
            ("REFRESH_INTERVAL_MS", "15000"),
            ("MAX_ARRIVALS", "3"),
            ("DISPLAY_TZ", "Europe/Paris"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.agency, DEFAULT_AGENCY);
        assert_eq!(config.refresh_interval, Duration::from_secs(15));
        assert_eq!(config.max_arrivals, 3);
        assert_eq!(config.display_tz, chrono_tz::Europe::Paris);
        assert_eq!(config.stops, default_stops());
    }

    #[test]
    fn test_feed_settings_ignore_server_values() {
        let get = lookup(&[
            ("PORT", "not-a-port"),
            ("STOPS_FILE", "/nonexistent/transit_monitor_stops.json"),
            ("MAX_ARRIVALS", "4"),
        ]);

        assert!(Config::from_lookup(&get).is_err());
        assert_eq!(
            FeedSettings::from_lookup(&get).unwrap(),
            FeedSettings {
                max_arrivals: 4,
                display_tz: chrono_tz::America::Los_Angeles,
            }
        );
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = Config::from_lookup(&lookup(&[("API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }
}
