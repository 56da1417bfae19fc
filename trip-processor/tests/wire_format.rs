//! Pins the on-topic JSON formats: device-status input, segment-event
//! output, and the state-table changelog.

use chrono::{TimeZone, Utc};
use trip_processor::codec::{Codec, JsonCodec};
use trip_shared::{CloudEvent, Observation, Point, PointTime, Segment, SegmentEvent, State};

#[test]
fn device_status_input_decodes() {
    let raw = r#"{
        "id": "2f0c3c74-3f6e-4f53-9c6f-0b1d0e2f3a4b",
        "source": "src/A",
        "specversion": "1.0",
        "subject": "D1",
        "time": "2023-10-01T00:00:01Z",
        "type": "com.trips.device.status",
        "data": {
            "timestamp": "2023-10-01T00:00:00Z",
            "latitude": 39.75,
            "longitude": -105.02,
            "speed": null
        }
    }"#;

    let codec = JsonCodec::<CloudEvent<Observation>>::new();
    let event = codec.decode(raw.as_bytes()).unwrap();

    assert_eq!(event.source, "src/A");
    assert_eq!(event.subject.as_deref(), Some("D1"));
    assert_eq!(event.data.latitude, Some(39.75));
    assert_eq!(event.data.speed, None);
    assert_eq!(
        event.data.timestamp,
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn device_status_with_nulled_coordinates_decodes() {
    let raw = r#"{
        "id": "evt",
        "source": "src/A",
        "time": "2023-10-01T00:00:01Z",
        "type": "com.trips.device.status",
        "data": {
            "timestamp": "2023-10-01T00:00:00Z",
            "latitude": null,
            "longitude": null,
            "speed": 12.5
        }
    }"#;

    let codec = JsonCodec::<CloudEvent<Observation>>::new();
    let event = codec.decode(raw.as_bytes()).unwrap();
    assert!(event.data.point().is_none());
    assert_eq!(event.data.speed, Some(12.5));
}

#[test]
fn segment_event_output_shape() {
    let start = PointTime {
        point: Point {
            latitude: 39.75,
            longitude: -105.02,
        },
        time: Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap(),
    };
    let end = PointTime {
        point: Point {
            latitude: 39.76,
            longitude: -105.02,
        },
        time: Utc.with_ymd_and_hms(2023, 10, 1, 0, 1, 0).unwrap(),
    };
    let segment = Segment {
        id: "seg-1".to_string(),
        start,
        last_movement: end,
    };

    let event = SegmentEvent::completed("D1", segment);
    let envelope = CloudEvent::new("trips/segment-processor", "D1", "com.trips.segment.completed", event);

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["subject"], "D1");
    assert_eq!(json["type"], "com.trips.segment.completed");

    let data = &json["data"];
    assert_eq!(data["id"], "seg-1");
    assert_eq!(data["deviceId"], "D1");
    assert_eq!(data["completed"], true);
    assert_eq!(data["start"]["point"]["latitude"], 39.75);
    assert_eq!(data["start"]["time"], "2023-10-01T00:00:00Z");
    assert_eq!(data["end"]["point"]["latitude"], 39.76);
    assert_eq!(data["end"]["time"], "2023-10-01T00:01:00Z");
}

#[test]
fn start_event_omits_end() {
    let start = PointTime {
        point: Point {
            latitude: 39.75,
            longitude: -105.02,
        },
        time: Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap(),
    };
    let segment = Segment {
        id: "seg-2".to_string(),
        start,
        last_movement: start,
    };

    let json = serde_json::to_value(SegmentEvent::opened("D1", &segment)).unwrap();
    assert_eq!(json["completed"], false);
    assert!(json.get("end").is_none());
}

#[test]
fn state_changelog_round_trip() {
    let raw = r#"{
        "latest": {
            "point": { "latitude": 39.76, "longitude": -105.02 },
            "time": "2023-10-01T00:01:00Z"
        },
        "activeSegment": {
            "id": "seg-3",
            "start": {
                "point": { "latitude": 39.75, "longitude": -105.02 },
                "time": "2023-10-01T00:00:00Z"
            },
            "lastMovement": {
                "point": { "latitude": 39.76, "longitude": -105.02 },
                "time": "2023-10-01T00:01:00Z"
            }
        }
    }"#;

    let codec = JsonCodec::<State>::new();
    let state = codec.decode(raw.as_bytes()).unwrap();
    let segment = state.active_segment.as_ref().unwrap();
    assert_eq!(segment.id, "seg-3");
    assert_eq!(segment.last_movement.point.latitude, 39.76);

    let bytes = codec.encode(&state).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(json["activeSegment"]["lastMovement"].is_object());
}
