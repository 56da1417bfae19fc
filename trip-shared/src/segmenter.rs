//! Per-device segment state machine.
//!
//! Consumes one observation plus the device's current state and
//! produces the next state and zero or more segment events. The
//! machine has two states per device: Idle (no active segment) and
//! InTrip (active segment present). Transitions are driven by the
//! estimated speed of the observation:
//!
//! - Idle, speed at or above the threshold: a segment opens at the
//!   previously known point and a start event is emitted.
//! - InTrip, speed at or above the threshold: the segment's last
//!   movement advances.
//! - InTrip, speed below the threshold: the segment survives until a
//!   full grace period has elapsed since the last movement, then a
//!   completed event is emitted and the segment is cleared.
//!
//! Closure is event-time driven; a silent device leaves its segment
//! open until the next observation arrives.

use std::collections::HashSet;

use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::cloudevent::CloudEvent;
use crate::speed::{estimate_kmh, SpeedUnit};
use crate::telemetry::{Observation, PointTime, Segment, SegmentEvent, State};

/// Tuning knobs for the state machine. Defaults match the production
/// deployment.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Speed at or above which the device counts as genuinely moving,
    /// in km/h. Apparent motion below this is GPS drift.
    pub speed_threshold_kmh: f64,

    /// How long a trip may idle below the threshold before it closes.
    pub grace_period: Duration,

    /// CloudEvent sources whose observations are accepted. An empty
    /// set accepts every source.
    pub accepted_sources: HashSet<String>,

    /// Unit of the reported `speed` field on observations.
    pub speed_unit: SpeedUnit,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            speed_threshold_kmh: 15.0,
            grace_period: Duration::minutes(15),
            accepted_sources: HashSet::new(),
            speed_unit: SpeedUnit::default(),
        }
    }
}

/// Outcome of one transition. `state: None` means the input was
/// filtered or unusable and the table must not be touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Option<State>,
    pub events: Vec<SegmentEvent>,
}

impl Transition {
    fn skip() -> Self {
        Self {
            state: None,
            events: Vec::new(),
        }
    }

    fn store(state: State) -> Self {
        Self {
            state: Some(state),
            events: Vec::new(),
        }
    }
}

/// The per-device segmentation state machine.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    fn accepts_source(&self, source: &str) -> bool {
        self.config.accepted_sources.is_empty() || self.config.accepted_sources.contains(source)
    }

    /// Run one transition for `device_id`.
    ///
    /// Filtering happens here, before any state is touched: events
    /// from unknown sources and observations carrying neither a speed
    /// nor full coordinates are discarded without mutating state or
    /// emitting.
    pub fn process(
        &self,
        device_id: &str,
        state: Option<State>,
        event: &CloudEvent<Observation>,
    ) -> Transition {
        if !self.accepts_source(&event.source) {
            return Transition::skip();
        }

        let obs = &event.data;
        if !obs.is_usable() {
            return Transition::skip();
        }

        let Some(mut state) = state else {
            // First contact. A segment cannot open on a single point,
            // and without coordinates there is nothing to record yet.
            let Some(point) = obs.point() else {
                debug!(device_id, "first observation has no coordinates, skipping");
                return Transition::skip();
            };
            return Transition::store(State::bootstrap(PointTime {
                point,
                time: obs.timestamp,
            }));
        };

        let speed = estimate_kmh(&state.latest, obs, self.config.speed_unit);

        // Where the device is now. Observations reporting speed
        // without a GPS fix inherit the last-known coordinates.
        let here = PointTime {
            point: obs.point().unwrap_or(state.latest.point),
            time: obs.timestamp,
        };

        let mut events = Vec::new();

        if speed >= self.config.speed_threshold_kmh {
            match state.active_segment.as_mut() {
                Some(segment) => segment.last_movement = here,
                None => {
                    // Motion reveals that the trip began at the
                    // previously idle location.
                    let segment = Segment {
                        id: Uuid::new_v4().to_string(),
                        start: state.latest,
                        last_movement: here,
                    };
                    events.push(SegmentEvent::opened(device_id, &segment));
                    state.active_segment = Some(segment);
                }
            }
        } else if let Some(segment) = state.active_segment.take() {
            let idle = obs.timestamp.signed_duration_since(segment.last_movement.time);
            if idle >= self.config.grace_period {
                // The standstill tail is not part of the trip: the
                // segment ends at the last movement.
                events.push(SegmentEvent::completed(device_id, segment));
            } else {
                state.active_segment = Some(segment);
            }
        }

        if obs.timestamp > state.latest.time {
            state.latest = here;
        }

        Transition {
            state: Some(state),
            events,
        }
    }
}
