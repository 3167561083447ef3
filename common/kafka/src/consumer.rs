use metrics::gauge;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::ClientConfig;

use crate::config::{ConsumerConfig, KafkaConfig};

pub struct KafkaConsumerContext;

impl rdkafka::ClientContext for KafkaConsumerContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // Lag per owned partition, straight from librdkafka's statistics.
        for (topic, topic_stats) in stats.topics {
            for (partition, partition_stats) in topic_stats.partitions {
                if partition_stats.consumer_lag >= 0 {
                    gauge!(
                        "consumer_lag",
                        "topic" => topic.clone(),
                        "partition" => partition.to_string()
                    )
                    .set(partition_stats.consumer_lag as f64);
                }
            }
        }
    }
}

impl ConsumerContext for KafkaConsumerContext {}

/// Builds a group consumer for the configured topic. Auto offset *storing*
/// is disabled: the batch consumer stores an offset only once the record is
/// durable downstream, and the auto-commit timer flushes what was stored.
pub fn create_stream_consumer(
    kafka: &KafkaConfig,
    consumer: &ConsumerConfig,
) -> Result<StreamConsumer<KafkaConsumerContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &kafka.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("group.id", &consumer.consumer_group)
        .set("session.timeout.ms", "10000")
        .set("auto.offset.reset", &consumer.consumer_offset_reset)
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false");

    if kafka.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    let stream_consumer: StreamConsumer<KafkaConsumerContext> =
        client_config.create_with_context(KafkaConsumerContext)?;
    stream_consumer.subscribe(&[consumer.consumer_topic.as_str()])?;

    Ok(stream_consumer)
}
