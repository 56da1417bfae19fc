//! Instantaneous speed estimation.
//!
//! Prefers the speed the device reports; falls back to displacement
//! over elapsed time between the previous and current observation.

use serde::{Deserialize, Serialize};

use crate::geodesy::haversine_distance;
use crate::telemetry::{Observation, PointTime};

const MS_TO_KMH: f64 = 3.6;

/// Unit of the `speed` field on incoming observations. Upstream
/// integrations disagree on this, so it is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    /// `speed` is already km/h.
    #[default]
    #[serde(rename = "kmh")]
    KilometersPerHour,

    /// `speed` is m/s and is converted before thresholding.
    #[serde(rename = "ms")]
    MetersPerSecond,
}

impl SpeedUnit {
    pub fn to_kmh(self, value: f64) -> f64 {
        match self {
            SpeedUnit::KilometersPerHour => value,
            SpeedUnit::MetersPerSecond => value * MS_TO_KMH,
        }
    }
}

impl std::str::FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmh" | "km/h" => Ok(SpeedUnit::KilometersPerHour),
            "ms" | "m/s" => Ok(SpeedUnit::MetersPerSecond),
            other => Err(format!("unknown speed unit: {other}")),
        }
    }
}

/// Estimate the device's speed in km/h for an observation, given the
/// previously accepted point.
///
/// The reported value wins when present. Otherwise the estimate is
/// displacement over elapsed time, defined only when the observation
/// has coordinates and is strictly later than the previous point; in
/// every other case no motion can be inferred and the estimate is 0.
pub fn estimate_kmh(prev: &PointTime, obs: &Observation, unit: SpeedUnit) -> f64 {
    if let Some(reported) = obs.speed {
        return unit.to_kmh(reported);
    }

    if let Some(point) = obs.point() {
        let elapsed_ms = obs.timestamp.signed_duration_since(prev.time).num_milliseconds();
        if elapsed_ms > 0 {
            let meters = haversine_distance(&prev.point, &point);
            return meters / (elapsed_ms as f64 / 1000.0) * MS_TO_KMH;
        }
    }

    0.0
}
