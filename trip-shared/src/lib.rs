//! Shared domain model and segmentation core for the trips pipeline.
//!
//! This crate contains everything the segment processor needs that does
//! not touch a broker: the telemetry data model, the CloudEvent
//! envelope, geodesy and speed estimation, the per-device segment state
//! machine, configuration, and a deterministic harness for driving the
//! state machine from tests.

pub mod cloudevent;
pub mod config;
pub mod exception;
pub mod geodesy;
pub mod harness;
pub mod segmenter;
pub mod speed;
pub mod telemetry;

pub use cloudevent::CloudEvent;
pub use config::Settings;
pub use exception::{TripError, TripResult};
pub use segmenter::{Segmenter, SegmenterConfig, Transition};
pub use speed::SpeedUnit;
pub use telemetry::{Observation, Point, PointTime, Segment, SegmentEvent, State};
