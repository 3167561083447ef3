use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use rdkafka::error::KafkaError;
use rdkafka::message::OwnedHeaders;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{debug, error, info};

use common_types::{Event, WireError};

use crate::config::KafkaConfig;
use crate::headers::event_headers;

const MESSAGES_PRODUCED: &str = "kafka_messages_produced_total";
const PRODUCE_DURATION: &str = "kafka_produce_duration_seconds";
const MESSAGE_SIZE: &str = "kafka_message_size_bytes";

pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // The main rdkafka loop is alive and calling us; export queue depths.
        gauge!("kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] WireError),
    #[error("failed to produce to kafka: {0}")]
    Kafka(#[from] KafkaError),
    #[error("produce cancelled before delivery was acknowledged")]
    Cancelled,
}

pub async fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("acks", "all")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_producer_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> = client_config.create_with_context(KafkaContext)?;

    // Ping the cluster by requesting metadata so a dead broker fails startup
    // instead of the first publish.
    match producer
        .client()
        .fetch_metadata(None, Duration::from_secs(10))
    {
        Ok(metadata) => {
            info!(
                topics = metadata.topics().len(),
                "connected to Kafka brokers"
            );
        }
        Err(err) => {
            error!("failed to fetch metadata from Kafka brokers: {err}");
            return Err(err);
        }
    }

    Ok(producer)
}

/// The single capability the ingest handler holds: durably enqueue one event.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), PublishError>;
}

pub struct KafkaEventPublisher {
    producer: FutureProducer<KafkaContext>,
    topic: String,
    timeout: Duration,
}

impl KafkaEventPublisher {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: String, timeout: Duration) -> Self {
        KafkaEventPublisher {
            producer,
            topic,
            timeout,
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let payload = event.to_wire()?;
        let record = FutureRecord::to(&self.topic)
            .key(event.match_id.as_bytes())
            .payload(&payload)
            .headers(event_headers(event));

        let start = std::time::Instant::now();
        let result = self.producer.send(record, Timeout::After(self.timeout)).await;

        histogram!(PRODUCE_DURATION, "topic" => self.topic.clone())
            .record(start.elapsed().as_secs_f64());
        histogram!(MESSAGE_SIZE, "topic" => self.topic.clone()).record(payload.len() as f64);

        match result {
            Ok(_) => {
                counter!(MESSAGES_PRODUCED, "topic" => self.topic.clone(), "status" => "success")
                    .increment(1);
                debug!(
                    event_id = %event.event_id,
                    match_id = %event.match_id,
                    event_type = %event.event_type,
                    "produced event"
                );
                Ok(())
            }
            Err((err, _)) => {
                counter!(MESSAGES_PRODUCED, "topic" => self.topic.clone(), "status" => "error")
                    .increment(1);
                error!(
                    event_id = %event.event_id,
                    match_id = %event.match_id,
                    "failed to produce event: {err}"
                );
                Err(PublishError::Kafka(err))
            }
        }
    }
}

/// A record headed for the retry or dead-letter lane.
pub struct OutboundRecord {
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: OwnedHeaders,
}

/// Enqueues every record, then waits for all broker ACKs. Fails on the first
/// delivery error so the caller can escalate the whole set.
pub async fn send_all(
    producer: &FutureProducer<KafkaContext>,
    topic: &str,
    records: &[OutboundRecord],
) -> Result<(), PublishError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut delivery_futures = Vec::with_capacity(records.len());
    for record in records {
        match producer.send_result(FutureRecord {
            topic,
            partition: None,
            payload: Some(&record.payload),
            key: Some(record.key.as_bytes()),
            timestamp: None,
            headers: Some(record.headers.clone()),
        }) {
            Ok(future) => delivery_futures.push(future),
            Err((error, _)) => return Err(PublishError::Kafka(error)),
        }
    }

    for result in join_all(delivery_futures).await {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err((error, _))) => return Err(PublishError::Kafka(error)),
            // Cancelled due to timeout while retrying
            Err(_) => return Err(PublishError::Cancelled),
        }
    }

    Ok(())
}
