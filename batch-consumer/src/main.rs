use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use batch_consumer::batch::BatchConsumer;
use batch_consumer::config::Config;
use common_kafka::{create_kafka_producer, create_stream_consumer};
use common_metrics::{serve, setup_metrics_routes};
use common_store::{ClickHouseStore, EventStore};

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };
}

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn index() -> &'static str {
    "match-event batch consumer"
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::init_from_env().expect("invalid configuration:");
    info!("starting match-event batch consumer");

    let store = Arc::new(ClickHouseStore::new(&config.clickhouse));
    if let Err(err) = store.ping().await {
        error!("failed to reach ClickHouse: {err}");
        std::process::exit(1);
    }
    info!(
        database = %config.clickhouse.clickhouse_database,
        "ClickHouse connection established"
    );

    let consumer = create_stream_consumer(&config.kafka, &config.consumer)
        .expect("failed to create Kafka consumer");
    let producer = create_kafka_producer(&config.kafka)
        .await
        .expect("failed to create Kafka producer");

    let batch_consumer = Arc::new(BatchConsumer::new(
        consumer,
        store,
        producer,
        config.kafka.kafka_topic_retry.clone(),
        config.kafka.kafka_topic_dead.clone(),
        &config.consumer,
    ));

    let bind = config.metrics_bind();
    let status_router = setup_metrics_routes(
        Router::new()
            .route("/", get(index))
            .route("/_liveness", get(index)),
    );
    tokio::spawn(async move {
        if let Err(err) = serve(status_router, &bind).await {
            error!("metrics server error: {err}");
        }
    });

    let shutdown = CancellationToken::new();
    let worker = {
        let consumer = batch_consumer.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { consumer.run(token).await })
    };

    info!(
        topic = %config.consumer.consumer_topic,
        group = %config.consumer.consumer_group,
        retry_topic = %config.kafka.kafka_topic_retry,
        dead_topic = %config.kafka.kafka_topic_dead,
        "batch consumer is running"
    );

    shutdown_signal().await;
    info!("shutdown signal received");

    shutdown.cancel();
    if let Err(err) = worker.await {
        error!("consumer task panicked: {err}");
    }

    info!("batch consumer shutdown complete");
}
