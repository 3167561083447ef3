use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(from = "KAFKA_TOPIC_EVENTS", default = "events")]
    pub kafka_topic_events: String,

    #[envconfig(from = "KAFKA_TOPIC_RETRY", default = "retry")]
    pub kafka_topic_retry: String,

    #[envconfig(from = "KAFKA_TOPIC_DEAD", default = "dead")]
    pub kafka_topic_dead: String,

    // Budget for a synchronous publish to be fully acknowledged.
    #[envconfig(from = "KAFKA_PRODUCER_TIMEOUT_MS", default = "10000")]
    pub kafka_producer_timeout_ms: u32,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    #[envconfig(from = "CONSUMER_GROUP", default = "analytics-consumers")]
    pub consumer_group: String,

    // The primary topic by default. A second instance with its own group can
    // be pointed at the retry topic to drain it symmetrically.
    #[envconfig(from = "CONSUMER_TOPIC", default = "events")]
    pub consumer_topic: String,

    #[envconfig(from = "CONSUMER_OFFSET_RESET", default = "earliest")]
    pub consumer_offset_reset: String, // earliest, latest

    #[envconfig(from = "CONSUMER_BATCH_SIZE", default = "1000")]
    pub batch_size: usize,

    #[envconfig(from = "CONSUMER_FLUSH_INTERVAL_SECS", default = "5")]
    pub flush_interval_secs: u64,

    #[envconfig(from = "CONSUMER_MAX_RETRIES", default = "3")]
    pub max_retries: u8,
}
