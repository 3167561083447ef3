//! The batch consumer: drain the primary topic, bulk-insert into ClickHouse,
//! commit offsets only once records are durable downstream, and escalate
//! failed batches through the retry and dead-letter lanes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::FutureProducer;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common_kafka::config::ConsumerConfig;
use common_kafka::{send_all, KafkaConsumerContext, KafkaContext};
use common_store::EventStore;
use common_types::Event;

use crate::retry::{
    dead_record, plan_escalation, quarantine_record, DEAD_LETTER_REASON,
};

const BATCHES_PROCESSED: &str = "consumer_batches_processed_total";
const EVENTS_CONSUMED: &str = "consumer_events_consumed_total";
const RETRY_EVENTS: &str = "consumer_retry_events_total";
const DEAD_LETTER_EVENTS: &str = "consumer_dead_letter_events_total";
const DEAD_LETTER_FAILURES: &str = "consumer_dead_letter_failures_total";
const INSERT_DURATION: &str = "consumer_insert_duration_seconds";

// Budget for flushing the in-memory batch once shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Decoded events and their source records, grown in lockstep. Records are
/// kept for offset commits and for re-publishing originals on failure.
pub struct BatchBuffer {
    events: Vec<Event>,
    records: Vec<OwnedMessage>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        BatchBuffer {
            events: Vec::with_capacity(capacity),
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends one decoded record and returns the new batch length.
    pub fn push(&mut self, event: Event, record: OwnedMessage) -> usize {
        self.events.push(event);
        self.records.push(record);
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Swaps the live buffers for fresh ones, so accumulation continues while
    /// the snapshot is flushed.
    pub fn take(&mut self) -> (Vec<Event>, Vec<OwnedMessage>) {
        (
            std::mem::replace(&mut self.events, Vec::with_capacity(self.capacity)),
            std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity)),
        )
    }
}

pub struct BatchConsumer {
    consumer: StreamConsumer<KafkaConsumerContext>,
    store: Arc<dyn EventStore>,
    producer: FutureProducer<KafkaContext>,
    retry_topic: String,
    dead_topic: String,
    batch_size: usize,
    flush_interval: Duration,
    max_retries: u8,
    buffer: Mutex<BatchBuffer>,
}

impl BatchConsumer {
    pub fn new(
        consumer: StreamConsumer<KafkaConsumerContext>,
        store: Arc<dyn EventStore>,
        producer: FutureProducer<KafkaContext>,
        retry_topic: String,
        dead_topic: String,
        config: &ConsumerConfig,
    ) -> Self {
        BatchConsumer {
            consumer,
            store,
            producer,
            retry_topic,
            dead_topic,
            batch_size: config.batch_size,
            flush_interval: Duration::from_secs(config.flush_interval_secs),
            max_retries: config.max_retries,
            buffer: Mutex::new(BatchBuffer::new(config.batch_size)),
        }
    }

    /// Fetches until the shutdown token fires, flushing whenever the batch is
    /// full or the flush interval elapses. Never returns on a transient
    /// error; a poisoned cycle is logged and the loop continues.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            batch_size = self.batch_size,
            flush_interval_secs = self.flush_interval.as_secs(),
            max_retries = self.max_retries,
            "starting batch consumer"
        );

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signalled, flushing remaining batch");
                    if tokio::time::timeout(DRAIN_TIMEOUT, self.flush()).await.is_err() {
                        error!("drain flush exceeded timeout, records will be redelivered");
                    }
                    self.commit_stored_offsets();
                    break;
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
                message = self.consumer.recv() => {
                    match message {
                        Ok(message) => self.handle_record(message.detach()).await,
                        Err(err) => {
                            error!("kafka consumer error: {err}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }

        info!("batch consumer stopped");
    }

    async fn handle_record(&self, record: OwnedMessage) {
        let Some(payload) = record.payload() else {
            counter!(EVENTS_CONSUMED, "status" => "parse_error").increment(1);
            self.quarantine(&record).await;
            return;
        };

        match Event::from_wire(payload) {
            Ok(event) => {
                let batch_len = {
                    let mut buffer = self.buffer.lock().unwrap();
                    buffer.push(event, record)
                };
                debug!(batch_size = batch_len, "record added to batch");

                if batch_len >= self.batch_size {
                    self.flush().await;
                }
            }
            Err(err) => {
                warn!(
                    partition = record.partition(),
                    offset = record.offset(),
                    "failed to decode record: {err}"
                );
                counter!(EVENTS_CONSUMED, "status" => "parse_error").increment(1);
                self.quarantine(&record).await;
            }
        }
    }

    /// A malformed record never blocks progress: the raw payload goes to the
    /// dead-letter topic and the offset advances either way.
    async fn quarantine(&self, record: &OwnedMessage) {
        let quarantined = quarantine_record(record, OffsetDateTime::now_utc());
        match send_all(&self.producer, &self.dead_topic, &[quarantined]).await {
            Ok(()) => {
                counter!(DEAD_LETTER_EVENTS).increment(1);
            }
            Err(err) => {
                counter!(DEAD_LETTER_FAILURES).increment(1);
                error!(
                    partition = record.partition(),
                    offset = record.offset(),
                    "failed to dead-letter undecodable record, payload dropped: {err}"
                );
            }
        }
        self.store_offset(record);
    }

    /// Snapshot the buffer, bulk-insert, and only then let offsets advance.
    pub async fn flush(&self) {
        let (events, records) = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.take()
        };
        if events.is_empty() {
            return;
        }

        let start = Instant::now();
        let result = self.store.insert_batch(&events).await;
        histogram!(INSERT_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                counter!(BATCHES_PROCESSED, "status" => "success").increment(1);
                counter!(EVENTS_CONSUMED, "status" => "success").increment(events.len() as u64);
                // A failed offset store only means redelivery; the rows are
                // already persisted and duplicates are tolerated.
                self.store_offsets(&records);
                info!(
                    batch_size = events.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "batch flushed"
                );
            }
            Err(err) => {
                counter!(BATCHES_PROCESSED, "status" => "error").increment(1);
                error!(
                    batch_size = events.len(),
                    "failed to insert batch: {err}"
                );
                self.escalate(events, records).await;
            }
        }
    }

    /// Re-publishes a failed batch: events within their attempt budget go to
    /// the retry topic, the rest to dead. Original offsets advance once every
    /// event is durable on one of the two lanes.
    async fn escalate(&self, events: Vec<Event>, records: Vec<OwnedMessage>) {
        let plan = plan_escalation(events, &records, self.max_retries);
        let mut dead = plan.dead;

        if !plan.retry_records.is_empty() {
            match send_all(&self.producer, &self.retry_topic, &plan.retry_records).await {
                Ok(()) => {
                    counter!(RETRY_EVENTS, "status" => "success")
                        .increment(plan.retry_records.len() as u64);
                    info!(
                        event_count = plan.retry_records.len(),
                        "events re-published to retry topic"
                    );
                }
                Err(err) => {
                    counter!(RETRY_EVENTS, "status" => "error")
                        .increment(plan.retry_records.len() as u64);
                    error!("failed to publish to retry topic, dead-lettering batch: {err}");
                    dead.extend(plan.retry_events);
                }
            }
        }

        let mut dead_failures = 0usize;
        for event in &dead {
            if !self.dead_letter(event).await {
                dead_failures += 1;
            }
        }

        if dead_failures == 0 {
            self.store_offsets(&records);
        } else {
            // Leave offsets where they are so the lost events get another
            // chance after a restart; duplicates on the surviving lanes are
            // an accepted at-least-once outcome.
            warn!(dead_failures, "offsets not stored after dead-letter failures");
        }
    }

    async fn dead_letter(&self, event: &Event) -> bool {
        let record = match dead_record(event, OffsetDateTime::now_utc(), DEAD_LETTER_REASON) {
            Ok(record) => record,
            Err(err) => {
                counter!(DEAD_LETTER_FAILURES).increment(1);
                error!(
                    event_id = %event.event_id,
                    "failed to build dead-letter envelope, event lost: {err}"
                );
                return false;
            }
        };

        match send_all(&self.producer, &self.dead_topic, &[record]).await {
            Ok(()) => {
                counter!(DEAD_LETTER_EVENTS).increment(1);
                warn!(
                    event_id = %event.event_id,
                    match_id = %event.match_id,
                    "event sent to dead-letter topic"
                );
                true
            }
            Err(err) => {
                counter!(DEAD_LETTER_FAILURES).increment(1);
                error!(
                    event_id = %event.event_id,
                    "failed to write to dead-letter topic, event lost: {err}"
                );
                false
            }
        }
    }

    fn store_offset(&self, record: &OwnedMessage) {
        if let Err(err) =
            self.consumer
                .store_offset(record.topic(), record.partition(), record.offset())
        {
            error!(
                partition = record.partition(),
                offset = record.offset(),
                "failed to store offset: {err}"
            );
        }
    }

    fn store_offsets(&self, records: &[OwnedMessage]) {
        for record in records {
            self.store_offset(record);
        }
    }

    /// Flushes stored offsets to the group on shutdown; the periodic
    /// auto-commit handles them while running.
    fn commit_stored_offsets(&self) {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => {}
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
            Err(err) => warn!("failed to commit offsets on shutdown: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::EventRequest;
    use rdkafka::message::Timestamp;

    fn test_event(match_id: &str) -> Event {
        EventRequest {
            event_id: uuid::Uuid::new_v4().to_string(),
            match_id: match_id.to_string(),
            event_type: "pass".to_string(),
            timestamp: "2024-03-01T20:15:30Z".to_string(),
            team_id: 1,
            ..Default::default()
        }
        .parse()
        .unwrap()
    }

    fn test_record(offset: i64) -> OwnedMessage {
        OwnedMessage::new(
            Some(b"{}".to_vec()),
            Some(b"match-1".to_vec()),
            "events".to_string(),
            Timestamp::NotAvailable,
            0,
            offset,
            None,
        )
    }

    #[test]
    fn buffer_grows_events_and_records_in_lockstep() {
        let mut buffer = BatchBuffer::new(4);
        assert!(buffer.is_empty());

        assert_eq!(buffer.push(test_event("match-1"), test_record(1)), 1);
        assert_eq!(buffer.push(test_event("match-1"), test_record(2)), 2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn take_snapshots_and_resets_the_buffer() {
        let mut buffer = BatchBuffer::new(4);
        buffer.push(test_event("match-1"), test_record(1));
        buffer.push(test_event("match-2"), test_record(2));

        let (events, records) = buffer.take();
        assert_eq!(events.len(), 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].offset(), 2);

        assert!(buffer.is_empty());
        // A fresh snapshot is empty.
        let (events, records) = buffer.take();
        assert!(events.is_empty());
        assert!(records.is_empty());
    }
}
