//! Per-device state table, co-partitioned with the input stream.
//!
//! Each input partition owns one in-memory slice of the table. The
//! slice is durably mirrored to a changelog topic (`<group>-table`)
//! keyed and partitioned identically to the input, and is rebuilt from
//! that topic when a partition worker starts.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};
use trip_shared::State;

use crate::codec::{Codec, JsonCodec};
use crate::error::{ProcessorError, ProcessorResult};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(30);
const WATERMARK_TIMEOUT: Duration = Duration::from_secs(10);
const RESTORE_POLL: Duration = Duration::from_millis(500);

/// Maximum consecutive empty polls tolerated while a restore has not
/// reached the high watermark.
const RESTORE_MAX_IDLE_POLLS: u32 = 20;

/// Handle to the changelog-backed state table.
pub struct GroupTable {
    topic: String,
    brokers: String,
    group: String,
    producer: FutureProducer,
    codec: JsonCodec<State>,
}

impl GroupTable {
    pub fn new(brokers: &str, group: &str, producer: FutureProducer) -> Self {
        Self {
            topic: format!("{group}-table"),
            brokers: brokers.to_string(),
            group: group.to_string(),
            producer,
            codec: JsonCodec::new(),
        }
    }

    /// Changelog topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Rebuild one partition's slice by reading its changelog from the
    /// beginning to the current high watermark.
    pub async fn restore_partition(&self, partition: i32) -> ProcessorResult<PartitionStore> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", format!("{}-restore", self.group))
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false");
        let topic = self.topic.clone();

        let entries = tokio::task::spawn_blocking(move || restore_blocking(config, &topic, partition))
            .await
            .map_err(|e| ProcessorError::internal(format!("restore task panicked: {e}")))??;

        info!(partition, entries = entries.len(), "state table restored");
        Ok(PartitionStore { partition, entries })
    }

    /// Mirror a state rewrite to the changelog. The caller applies the
    /// write to its in-memory slice only after this succeeds.
    pub async fn persist(&self, partition: i32, key: &str, state: &State) -> ProcessorResult<()> {
        let payload = self.codec.encode(state)?;
        let record = FutureRecord::to(&self.topic)
            .partition(partition)
            .key(key)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(PRODUCE_TIMEOUT))
            .await
            .map_err(|(err, _)| ProcessorError::Kafka(err))?;
        Ok(())
    }
}

/// One partition's in-memory slice of the state table. Owned by the
/// partition's worker; never shared.
#[derive(Debug)]
pub struct PartitionStore {
    partition: i32,
    entries: HashMap<String, State>,
}

impl PartitionStore {
    /// Empty slice, for partitions whose changelog has no data yet.
    pub fn empty(partition: i32) -> Self {
        Self {
            partition,
            entries: HashMap::new(),
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn get(&self, key: &str) -> Option<&State> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, state: State) {
        self.entries.insert(key, state);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn restore_blocking(
    config: ClientConfig,
    topic: &str,
    partition: i32,
) -> ProcessorResult<HashMap<String, State>> {
    let consumer: BaseConsumer = config.create()?;
    let mut entries = HashMap::new();

    let (low, high) = match consumer.fetch_watermarks(topic, partition, WATERMARK_TIMEOUT) {
        Ok(marks) => marks,
        // The changelog is created on first write; a missing topic
        // just means an empty table.
        Err(KafkaError::MetadataFetch(RDKafkaErrorCode::UnknownTopicOrPartition)) => {
            debug!(topic, partition, "changelog topic not found, starting empty");
            return Ok(entries);
        }
        Err(err) => return Err(err.into()),
    };

    if high <= low {
        return Ok(entries);
    }

    let mut assignment = TopicPartitionList::new();
    assignment.add_partition_offset(topic, partition, Offset::Beginning)?;
    consumer.assign(&assignment)?;

    let codec = JsonCodec::<State>::new();
    let mut next = low;
    let mut idle_polls = 0u32;

    while next < high {
        match consumer.poll(RESTORE_POLL) {
            Some(Ok(message)) => {
                idle_polls = 0;
                next = message.offset() + 1;

                let Some(key) = message.key() else {
                    continue;
                };
                let key = String::from_utf8_lossy(key).into_owned();

                match message.payload() {
                    Some(payload) => match codec.decode(payload) {
                        Ok(state) => {
                            entries.insert(key, state);
                        }
                        Err(err) => {
                            warn!(topic, partition, %key, "skipping corrupt changelog record: {err}");
                        }
                    },
                    // Tombstone: the key was compacted away.
                    None => {
                        entries.remove(&key);
                    }
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => {
                idle_polls += 1;
                if idle_polls > RESTORE_MAX_IDLE_POLLS {
                    return Err(ProcessorError::state_restore(format!(
                        "partition {partition} stalled at offset {next} of {high}"
                    )));
                }
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trip_shared::{Point, PointTime};

    fn state() -> State {
        State::bootstrap(PointTime {
            point: Point {
                latitude: 1.0,
                longitude: 2.0,
            },
            time: Utc::now(),
        })
    }

    #[test]
    fn test_partition_store_ops() {
        let mut store = PartitionStore::empty(3);
        assert_eq!(store.partition(), 3);
        assert!(store.is_empty());

        store.insert("device-1".to_string(), state());
        assert_eq!(store.len(), 1);
        assert!(store.get("device-1").is_some());
        assert!(store.get("device-2").is_none());

        // Rewrites are idempotent replacements.
        store.insert("device-1".to_string(), state());
        assert_eq!(store.len(), 1);
    }
}
