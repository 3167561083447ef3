use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use common_kafka::EventPublisher;
use common_metrics::{setup_metrics_recorder, track_metrics};
use common_store::MetricsRepository;

use crate::handlers;
use crate::time::Clock;

const EVENT_BODY_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// The two capabilities the handlers hold, plus the clock used to stamp
/// responses.
#[derive(Clone)]
pub struct State {
    pub publisher: Arc<dyn EventPublisher>,
    pub repository: Arc<dyn MetricsRepository>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

async fn index() -> &'static str {
    "match-event ingest"
}

pub fn router<
    C: Clock + Send + Sync + 'static,
    P: EventPublisher + 'static,
    R: MetricsRepository + 'static,
>(
    clock: C,
    publisher: P,
    repository: R,
    metrics: bool,
) -> Router {
    let state = State {
        publisher: Arc::new(publisher),
        repository: Arc::new(repository),
        clock: Arc::new(clock),
    };

    let api_router = Router::new()
        .route("/api/events", post(handlers::ingest_event))
        .route("/api/matches/:match_id/metrics", get(handlers::match_metrics))
        .layer(DefaultBodyLimit::max(EVENT_BODY_SIZE));

    let status_router = Router::new()
        .route("/", get(index))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::readiness));

    let router = Router::new()
        .merge(api_router)
        .merge(status_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when this crate is used as a library
    // (during tests etc) does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
