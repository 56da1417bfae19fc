//! Telemetry data model: observations in, segment state and segment
//! events out.
//!
//! Absent values are represented with `Option`, never with zero
//! sentinels; a latitude of 0.0 is a real place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic point in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

/// A point fixed in time. The spatial/temporal record kept in state
/// and reported on segment boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointTime {
    pub point: Point,
    pub time: DateTime<Utc>,
}

/// Per-device telemetry at an instant, the payload of a device-status
/// CloudEvent. The device id is the record key and envelope subject;
/// the integration id is the envelope source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Speed reported by the device, in the configured input unit.
    #[serde(default)]
    pub speed: Option<f64>,
}

impl Observation {
    /// Coordinates of the observation, if it carries both.
    pub fn point(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Point { latitude, longitude }),
            _ => None,
        }
    }

    /// An observation lacking both a reported speed and full
    /// coordinates carries no usable signal.
    pub fn is_usable(&self) -> bool {
        self.speed.is_some() || self.point().is_some()
    }
}

/// An open trip: where motion was first detected and where it was
/// last seen above the movement threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub start: PointTime,
    pub last_movement: PointTime,
}

/// Per-device persisted record in the group table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Most recent accepted observation.
    pub latest: PointTime,

    /// Present while the device is in a trip.
    #[serde(default)]
    pub active_segment: Option<Segment>,
}

impl State {
    /// Bootstrap state from a device's first located observation.
    pub fn bootstrap(latest: PointTime) -> Self {
        Self {
            latest,
            active_segment: None,
        }
    }
}

/// Output record: one per segment boundary. For every segment id
/// exactly one `completed == false` event precedes exactly one
/// `completed == true` event on the same partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEvent {
    pub id: String,
    pub device_id: String,
    pub start: PointTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<PointTime>,

    pub completed: bool,
}

impl SegmentEvent {
    /// Event announcing a freshly opened segment.
    pub fn opened(device_id: &str, segment: &Segment) -> Self {
        Self {
            id: segment.id.clone(),
            device_id: device_id.to_string(),
            start: segment.start,
            end: None,
            completed: false,
        }
    }

    /// Event closing a segment. The end is the last above-threshold
    /// movement, not the observation that triggered close-out.
    pub fn completed(device_id: &str, segment: Segment) -> Self {
        Self {
            id: segment.id,
            device_id: device_id.to_string(),
            start: segment.start,
            end: Some(segment.last_movement),
            completed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point_time() -> PointTime {
        PointTime {
            point: Point {
                latitude: 39.75,
                longitude: -105.02,
            },
            time: Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_observation_usability() {
        let located = Observation {
            timestamp: Utc::now(),
            latitude: Some(39.75),
            longitude: Some(-105.02),
            speed: None,
        };
        assert!(located.is_usable());
        assert!(located.point().is_some());

        let speed_only = Observation {
            timestamp: Utc::now(),
            latitude: None,
            longitude: None,
            speed: Some(42.0),
        };
        assert!(speed_only.is_usable());
        assert!(speed_only.point().is_none());

        let half_located = Observation {
            timestamp: Utc::now(),
            latitude: Some(39.75),
            longitude: None,
            speed: None,
        };
        assert!(!half_located.is_usable());
    }

    #[test]
    fn test_state_wire_format() {
        let state = State {
            latest: point_time(),
            active_segment: Some(Segment {
                id: "seg-1".to_string(),
                start: point_time(),
                last_movement: point_time(),
            }),
        };

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("latest").is_some());
        assert!(json["activeSegment"].get("lastMovement").is_some());
        assert_eq!(json["latest"]["point"]["latitude"], 39.75);
        assert_eq!(json["latest"]["time"], "2023-10-01T00:00:00Z");
    }

    #[test]
    fn test_state_decodes_without_active_segment() {
        let raw = r#"{
            "latest": {
                "point": { "latitude": 39.75, "longitude": -105.02 },
                "time": "2023-10-01T00:00:00Z"
            }
        }"#;
        let state: State = serde_json::from_str(raw).unwrap();
        assert!(state.active_segment.is_none());
    }

    #[test]
    fn test_segment_event_wire_format() {
        let segment = Segment {
            id: "seg-2".to_string(),
            start: point_time(),
            last_movement: point_time(),
        };

        let start = SegmentEvent::opened("device-1", &segment);
        let json = serde_json::to_value(&start).unwrap();
        assert_eq!(json["deviceId"], "device-1");
        assert_eq!(json["completed"], false);
        assert!(json.get("end").is_none());

        let end = SegmentEvent::completed("device-1", segment);
        let json = serde_json::to_value(&end).unwrap();
        assert_eq!(json["completed"], true);
        assert_eq!(json["end"]["time"], "2023-10-01T00:00:00Z");
    }
}
