pub mod config;
pub mod consumer;
pub mod headers;
pub mod producer;

pub use config::{ConsumerConfig, KafkaConfig};
pub use consumer::{create_stream_consumer, KafkaConsumerContext};
pub use producer::{
    create_kafka_producer, send_all, EventPublisher, KafkaContext, KafkaEventPublisher,
    OutboundRecord, PublishError,
};
