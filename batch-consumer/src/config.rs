use envconfig::Envconfig;

use common_kafka::{ConsumerConfig, KafkaConfig};
use common_store::ClickHouseConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub clickhouse: ClickHouseConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    // Liveness and prometheus exposition for the consumer process.
    #[envconfig(from = "CONSUMER_METRICS_PORT", default = "9091")]
    pub metrics_port: u16,
}

impl Config {
    pub fn metrics_bind(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}
