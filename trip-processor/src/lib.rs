//! Kafka runtime adapter for the segment state machine.
//!
//! Binds the pure segmentation core from `trip-shared` to a
//! partitioned stream processor: device-status CloudEvents in, segment
//! events out, with per-device state durably mirrored to a
//! co-partitioned changelog topic.
//!
//! Processing is parallel across partitions and strictly sequential
//! within one: a dispatcher reads the consumer and routes each record
//! to the worker task owning its partition.

pub mod codec;
pub mod error;
pub mod group_table;
pub mod metrics;
pub mod processor;

pub use error::{ProcessorError, ProcessorResult};
pub use processor::TripProcessor;
