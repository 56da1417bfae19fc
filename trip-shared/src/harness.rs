//! Deterministic driver for the segment state machine.
//!
//! Feeds scripted observation sequences through [`Segmenter::process`]
//! and records every state rewrite and emission, with no broker and no
//! wall clock involved. Scenario and property suites build on this.

use chrono::{DateTime, Utc};

use crate::cloudevent::CloudEvent;
use crate::segmenter::{Segmenter, SegmenterConfig};
use crate::telemetry::{Observation, SegmentEvent, State};

/// Event type used for scripted input records.
pub const DEVICE_STATUS_TYPE: &str = "com.trips.device.status";

/// In-memory stand-in for one device's slice of the processor: the
/// state machine plus the persisted state and the output stream.
#[derive(Debug, Default)]
pub struct SegmenterHarness {
    segmenter: Segmenter,
    state: Option<State>,
    emitted: Vec<SegmentEvent>,
}

impl SegmenterHarness {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            segmenter: Segmenter::new(config),
            state: None,
            emitted: Vec::new(),
        }
    }

    /// Run one transition, apply the state rewrite, and return the
    /// events this step emitted (they are also appended to
    /// [`events`](Self::events)).
    pub fn consume(&mut self, event: CloudEvent<Observation>) -> Vec<SegmentEvent> {
        let device_id = event.subject.clone().unwrap_or_default();
        let transition = self
            .segmenter
            .process(&device_id, self.state.clone(), &event);

        if let Some(next) = transition.state {
            self.state = Some(next);
        }
        self.emitted.extend(transition.events.iter().cloned());
        transition.events
    }

    /// Current persisted state, if any observation created one.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// All emissions so far, in order.
    pub fn events(&self) -> &[SegmentEvent] {
        &self.emitted
    }
}

/// Scripted device-status event with coordinates and an optional
/// reported speed.
pub fn status_event(
    source: &str,
    device_id: &str,
    time: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
) -> CloudEvent<Observation> {
    CloudEvent::new(
        source,
        device_id,
        DEVICE_STATUS_TYPE,
        Observation {
            timestamp: time,
            latitude,
            longitude,
            speed,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_harness_applies_rewrites_and_collects_events() {
        let mut harness = SegmenterHarness::new(SegmenterConfig {
            grace_period: chrono::Duration::seconds(60),
            ..SegmenterConfig::default()
        });
        let t0 = Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap();

        let step = harness.consume(status_event("src/A", "D1", t0, Some(39.75), Some(-105.02), None));
        assert!(step.is_empty());
        assert!(harness.state().is_some());

        let step = harness.consume(status_event(
            "src/A",
            "D1",
            t0 + chrono::Duration::seconds(60),
            Some(39.76),
            Some(-105.02),
            Some(40.0),
        ));
        assert_eq!(step.len(), 1);
        assert_eq!(harness.events().len(), 1);
    }
}
