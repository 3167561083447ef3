use envconfig::Envconfig;

use common_kafka::KafkaConfig;
use common_store::ClickHouseConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "SERVER_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "SERVER_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub clickhouse: ClickHouseConfig,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
