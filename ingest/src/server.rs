use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

use common_kafka::{create_kafka_producer, KafkaEventPublisher};
use common_store::{ClickHouseStore, MetricsRepository};

use crate::config::Config;
use crate::router;
use crate::time::SystemClock;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = ClickHouseStore::new(&config.clickhouse);
    store.ping().await.expect("failed to reach ClickHouse");

    let producer = create_kafka_producer(&config.kafka)
        .await
        .expect("failed to create Kafka producer");
    let publisher = KafkaEventPublisher::new(
        producer,
        config.kafka.kafka_topic_events.clone(),
        Duration::from_millis(config.kafka.kafka_producer_timeout_ms as u64),
    );

    let app = router::router(SystemClock, publisher, store, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .unwrap()
}
