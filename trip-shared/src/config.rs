//! Processor settings.
//!
//! Defaults are applied first, then an optional TOML settings file,
//! then environment variables. The TOML keys and the environment
//! variable names are identical, so a deployment can pick either.

use std::collections::HashSet;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::exception::{TripError, TripResult};
use crate::segmenter::SegmenterConfig;
use crate::speed::SpeedUnit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    /// Comma-separated broker endpoints.
    pub kafka_brokers: String,

    /// Consumer-group identifier. Also determines the state-table
    /// changelog topic name (`<group>-table`).
    pub consumer_group: String,

    /// Input topic of device-status CloudEvents.
    pub device_status_topic: String,

    /// Output topic of segment-event CloudEvents.
    pub trip_event_topic: String,

    /// TCP port of the monitoring endpoint.
    pub mon_port: u16,

    /// CloudEvent sources accepted on the input topic. Empty accepts
    /// every source.
    pub accepted_sources: Vec<String>,

    /// Idle duration tolerated inside an open segment, in seconds.
    pub grace_period: u64,

    /// Movement threshold in km/h.
    pub speed_threshold: f64,

    /// Unit of the reported `speed` field on observations.
    pub speed_unit: SpeedUnit,

    /// CloudEvent source stamped on emitted segment events.
    pub event_source: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kafka_brokers: "localhost:9092".to_string(),
            consumer_group: "trip-processor".to_string(),
            device_status_topic: "topic.device.status".to_string(),
            trip_event_topic: "topic.device.trip.event".to_string(),
            mon_port: 8888,
            accepted_sources: Vec::new(),
            grace_period: 900,
            speed_threshold: 15.0,
            speed_unit: SpeedUnit::default(),
            event_source: "trips/segment-processor".to_string(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the TOML file at `path` if it
    /// exists, then environment variables. The result is validated.
    pub fn load(path: Option<&Path>) -> TripResult<Self> {
        let mut settings = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    TripError::configuration(format!("cannot read {}: {e}", p.display()))
                })?;
                toml::from_str(&content).map_err(|e| {
                    TripError::configuration(format!("cannot parse {}: {e}", p.display()))
                })?
            }
            _ => Settings::default(),
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> TripResult<()> {
        if let Ok(v) = env::var("KAFKA_BROKERS") {
            self.kafka_brokers = v;
        }
        if let Ok(v) = env::var("CONSUMER_GROUP") {
            self.consumer_group = v;
        }
        if let Ok(v) = env::var("DEVICE_STATUS_TOPIC") {
            self.device_status_topic = v;
        }
        if let Ok(v) = env::var("TRIP_EVENT_TOPIC") {
            self.trip_event_topic = v;
        }
        if let Ok(v) = env::var("MON_PORT") {
            self.mon_port = v
                .parse()
                .map_err(|_| TripError::configuration(format!("MON_PORT is not a port: {v}")))?;
        }
        if let Ok(v) = env::var("ACCEPTED_SOURCES") {
            self.accepted_sources = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(v) = env::var("GRACE_PERIOD") {
            self.grace_period = v.parse().map_err(|_| {
                TripError::configuration(format!("GRACE_PERIOD is not a duration in seconds: {v}"))
            })?;
        }
        if let Ok(v) = env::var("SPEED_THRESHOLD") {
            self.speed_threshold = v.parse().map_err(|_| {
                TripError::configuration(format!("SPEED_THRESHOLD is not a number: {v}"))
            })?;
        }
        if let Ok(v) = env::var("SPEED_UNIT") {
            self.speed_unit = v.parse().map_err(TripError::Configuration)?;
        }
        if let Ok(v) = env::var("EVENT_SOURCE") {
            self.event_source = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> TripResult<()> {
        if self.kafka_brokers.trim().is_empty() {
            return Err(TripError::configuration("KAFKA_BROKERS must not be empty"));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(TripError::configuration("CONSUMER_GROUP must not be empty"));
        }
        if self.device_status_topic.trim().is_empty() || self.trip_event_topic.trim().is_empty() {
            return Err(TripError::configuration("topic names must not be empty"));
        }
        if self.device_status_topic == self.trip_event_topic {
            return Err(TripError::configuration(
                "DEVICE_STATUS_TOPIC and TRIP_EVENT_TOPIC must differ",
            ));
        }
        if self.mon_port == 0 {
            return Err(TripError::configuration("MON_PORT must be non-zero"));
        }
        if self.grace_period == 0 {
            return Err(TripError::configuration("GRACE_PERIOD must be positive"));
        }
        if !self.speed_threshold.is_finite() || self.speed_threshold <= 0.0 {
            return Err(TripError::configuration("SPEED_THRESHOLD must be positive"));
        }
        Ok(())
    }

    /// Changelog topic backing the per-device state table.
    pub fn table_topic(&self) -> String {
        format!("{}-table", self.consumer_group)
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            speed_threshold_kmh: self.speed_threshold,
            grace_period: chrono::Duration::seconds(self.grace_period as i64),
            accepted_sources: self
                .accepted_sources
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
            speed_unit: self.speed_unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.table_topic(), "trip-processor-table");
    }

    #[test]
    fn test_toml_keys_match_env_names() {
        let raw = r#"
            KAFKA_BROKERS = "broker-1:9092,broker-2:9092"
            CONSUMER_GROUP = "segmenter"
            ACCEPTED_SOURCES = ["src/A", "src/B"]
            GRACE_PERIOD = 300
            SPEED_UNIT = "ms"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.kafka_brokers, "broker-1:9092,broker-2:9092");
        assert_eq!(settings.consumer_group, "segmenter");
        assert_eq!(settings.accepted_sources.len(), 2);
        assert_eq!(settings.grace_period, 300);
        assert_eq!(settings.speed_unit, SpeedUnit::MetersPerSecond);
        // unspecified keys fall back to defaults
        assert_eq!(settings.mon_port, 8888);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.speed_threshold = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.trip_event_topic = settings.device_status_topic.clone();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.grace_period = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_segmenter_config_conversion() {
        let mut settings = Settings::default();
        settings.accepted_sources = vec!["src/A".to_string()];
        settings.grace_period = 60;

        let config = settings.segmenter_config();
        assert_eq!(config.grace_period, chrono::Duration::seconds(60));
        assert!(config.accepted_sources.contains("src/A"));
    }

    #[test]
    fn test_env_overrides_beat_defaults() {
        env::set_var("GRACE_PERIOD", "120");
        env::set_var("ACCEPTED_SOURCES", "src/A, src/B,");

        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.grace_period, 120);
        assert_eq!(
            settings.accepted_sources,
            vec!["src/A".to_string(), "src/B".to_string()]
        );

        env::remove_var("GRACE_PERIOD");
        env::remove_var("ACCEPTED_SOURCES");
    }
}
