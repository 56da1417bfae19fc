//! The processor host: consumes device-status records, drives the
//! state machine per device, persists state to the group table, and
//! emits segment events.
//!
//! A single dispatcher owns the consumer and routes each record to the
//! worker task owning its partition. Records of one partition are
//! processed strictly in order; distinct partitions proceed
//! concurrently. An input offset is stored only after every side
//! effect of its record succeeded, so a crash replays the record
//! (at-least-once; consumers dedupe on the segment id).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trip_shared::{CloudEvent, Observation, Segmenter, SegmentEvent, Settings};

use crate::error::{ProcessorError, ProcessorResult};
use crate::group_table::{GroupTable, PartitionStore};
use crate::metrics::{COMPLETED_SEGMENTS, MALFORMED_EVENTS, ONGOING_SEGMENTS};

/// CloudEvent type of segment-start events.
pub const SEGMENT_START_TYPE: &str = "com.trips.segment.start";

/// CloudEvent type of segment-completed events.
pub const SEGMENT_COMPLETED_TYPE: &str = "com.trips.segment.completed";

const WORKER_QUEUE_DEPTH: usize = 256;
const PRODUCE_TIMEOUT: Duration = Duration::from_secs(30);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The segment processor: one consumer, one producer, one state-table
/// handle, and a worker per assigned partition.
pub struct TripProcessor {
    settings: Settings,
    segmenter: Arc<Segmenter>,
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    table: Arc<GroupTable>,
}

impl TripProcessor {
    pub fn new(settings: Settings) -> ProcessorResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.kafka_brokers)
            .set("group.id", &settings.consumer_group)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            // Offsets are stored manually, after a record's side
            // effects are durable.
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.kafka_brokers)
            .set("message.timeout.ms", "30000")
            .set("enable.idempotence", "true")
            .set("compression.type", "snappy")
            .set("linger.ms", "10")
            .create()?;

        let table = Arc::new(GroupTable::new(
            &settings.kafka_brokers,
            &settings.consumer_group,
            producer.clone(),
        ));
        let segmenter = Arc::new(Segmenter::new(settings.segmenter_config()));

        Ok(Self {
            settings,
            segmenter,
            consumer: Arc::new(consumer),
            producer,
            table,
        })
    }

    /// Fail fast when the brokers are unreachable or the input topic
    /// is unknown.
    pub async fn check_startup(&self) -> ProcessorResult<()> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.settings.device_status_topic.clone();

        tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(Some(topic.as_str()), STARTUP_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| ProcessorError::internal(format!("metadata task panicked: {e}")))?
        .map_err(|e| ProcessorError::startup(format!("cannot reach brokers: {e}")))
    }

    /// Consume until cancelled or a worker hits an infrastructure
    /// error. On cancellation, workers drain their queues before the
    /// processor returns.
    pub async fn run(&self, shutdown: CancellationToken) -> ProcessorResult<()> {
        self.consumer
            .subscribe(&[self.settings.device_status_topic.as_str()])?;
        info!(
            topic = %self.settings.device_status_topic,
            group = %self.settings.consumer_group,
            "segment processor running"
        );

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<ProcessorError>();
        let mut workers: HashMap<i32, WorkerHandle> = HashMap::new();

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, draining partition workers");
                    break Ok(());
                }
                Some(err) = fatal_rx.recv() => {
                    error!("partition worker failed: {err}");
                    break Err(err);
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        let partition = message.partition();
                        let message = message.detach();
                        let worker = workers
                            .entry(partition)
                            .or_insert_with(|| self.spawn_worker(partition, fatal_tx.clone()));
                        if worker.queue.send(message).await.is_err() {
                            break Err(ProcessorError::internal(format!(
                                "worker for partition {partition} is gone"
                            )));
                        }
                    }
                    Err(err) => break Err(err.into()),
                },
            }
        };

        drop(fatal_tx);
        for (_, worker) in workers.drain() {
            drop(worker.queue);
            if let Err(err) = worker.task.await {
                warn!("partition worker join error: {err}");
            }
        }

        // A worker may have failed while the drain was in flight.
        if result.is_ok() {
            if let Ok(err) = fatal_rx.try_recv() {
                return Err(err);
            }
        }
        result
    }

    fn spawn_worker(
        &self,
        partition: i32,
        fatal: mpsc::UnboundedSender<ProcessorError>,
    ) -> WorkerHandle {
        info!(partition, "starting partition worker");
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);

        let worker = PartitionWorker {
            partition,
            queue: rx,
            consumer: Arc::clone(&self.consumer),
            producer: self.producer.clone(),
            table: Arc::clone(&self.table),
            segmenter: Arc::clone(&self.segmenter),
            output_topic: self.settings.trip_event_topic.clone(),
            event_source: self.settings.event_source.clone(),
        };

        let task = tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                let _ = fatal.send(err);
            }
        });

        WorkerHandle { queue: tx, task }
    }
}

struct WorkerHandle {
    queue: mpsc::Sender<OwnedMessage>,
    task: JoinHandle<()>,
}

/// Sequential processor for one partition. Owns the partition's state
/// slice; no locking anywhere.
struct PartitionWorker {
    partition: i32,
    queue: mpsc::Receiver<OwnedMessage>,
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    table: Arc<GroupTable>,
    segmenter: Arc<Segmenter>,
    output_topic: String,
    event_source: String,
}

impl PartitionWorker {
    async fn run(mut self) -> ProcessorResult<()> {
        let mut store = self.table.restore_partition(self.partition).await?;

        while let Some(message) = self.queue.recv().await {
            self.handle(&mut store, message).await?;
        }
        debug!(partition = self.partition, "partition worker drained");
        Ok(())
    }

    async fn handle(
        &self,
        store: &mut PartitionStore,
        message: OwnedMessage,
    ) -> ProcessorResult<()> {
        let Some(event) = self.decode(&message) else {
            return self.mark_done(&message);
        };

        let Some(device_id) = device_id_of(&message, &event) else {
            debug!(
                partition = self.partition,
                offset = message.offset(),
                "record has no device id, skipping"
            );
            counter!(MALFORMED_EVENTS).increment(1);
            return self.mark_done(&message);
        };

        let state = store.get(&device_id).cloned();
        let transition = self.segmenter.process(&device_id, state, &event);

        let Some(next) = transition.state else {
            // Filtered or unusable input: the table stays untouched.
            return self.mark_done(&message);
        };

        for segment_event in &transition.events {
            self.emit(&device_id, segment_event).await?;
            if segment_event.completed {
                counter!(COMPLETED_SEGMENTS).increment(1);
                gauge!(ONGOING_SEGMENTS).decrement(1.0);
            } else {
                gauge!(ONGOING_SEGMENTS).increment(1.0);
            }
        }

        self.table.persist(self.partition, &device_id, &next).await?;
        store.insert(device_id, next);

        self.mark_done(&message)
    }

    fn decode(&self, message: &OwnedMessage) -> Option<CloudEvent<Observation>> {
        let Some(payload) = message.payload() else {
            debug!(
                partition = self.partition,
                offset = message.offset(),
                "empty payload, skipping"
            );
            counter!(MALFORMED_EVENTS).increment(1);
            return None;
        };

        match serde_json::from_slice(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                debug!(
                    partition = self.partition,
                    offset = message.offset(),
                    "undecodable device-status record: {err}"
                );
                counter!(MALFORMED_EVENTS).increment(1);
                None
            }
        }
    }

    async fn emit(&self, device_id: &str, event: &SegmentEvent) -> ProcessorResult<()> {
        let event_type = if event.completed {
            SEGMENT_COMPLETED_TYPE
        } else {
            SEGMENT_START_TYPE
        };
        let envelope = CloudEvent::new(&self.event_source, device_id, event_type, event.clone());
        let payload = serde_json::to_vec(&envelope)?;

        let record = FutureRecord::to(&self.output_topic)
            .partition(self.partition)
            .key(device_id)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(PRODUCE_TIMEOUT))
            .await
            .map_err(|(err, _)| ProcessorError::Kafka(err))?;
        Ok(())
    }

    /// Store the record's offset; the client's auto-commit advances
    /// the group offset from here.
    fn mark_done(&self, message: &OwnedMessage) -> ProcessorResult<()> {
        self.consumer
            .store_offset(message.topic(), message.partition(), message.offset())?;
        Ok(())
    }
}

/// The device id is the record key; the envelope subject is the
/// fallback for producers that only set the subject.
fn device_id_of(message: &OwnedMessage, event: &CloudEvent<Observation>) -> Option<String> {
    if let Some(key) = message.key() {
        if !key.is_empty() {
            return Some(String::from_utf8_lossy(key).into_owned());
        }
    }
    event.subject.clone().filter(|subject| !subject.is_empty())
}
