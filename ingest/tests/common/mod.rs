use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use tower::ServiceExt;

use common_kafka::{EventPublisher, PublishError};
use common_store::{MetricsRepository, StoreError};
use common_types::{Event, EventsPerMinute, MatchMetrics};
use ingest::router::router;
use ingest::time::Clock;

/// What [`FixedClock`] renders to in response bodies.
pub const FROZEN_TIME: &str = "2024-03-01T21:00:00Z";

#[derive(Clone)]
pub struct FixedClock {}

impl Clock for FixedClock {
    fn now(&self) -> time::OffsetDateTime {
        time::macros::datetime!(2024-03-01 21:00:00 UTC)
    }
}

fn store_error(message: &str) -> StoreError {
    clickhouse::error::Error::Custom(message.to_string()).into()
}

#[derive(Default)]
pub struct MockPublisher {
    published: Mutex<Vec<Event>>,
    fail: bool,
}

impl MockPublisher {
    pub fn failing() -> Self {
        MockPublisher {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for Arc<MockPublisher> {
    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Cancelled);
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRepository {
    pub metrics: Option<MatchMetrics>,
    pub per_minute: Vec<EventsPerMinute>,
    pub fail_summary: bool,
    pub fail_per_minute: bool,
    pub fail_ping: bool,
}

#[async_trait]
impl MetricsRepository for MockRepository {
    async fn match_metrics(&self, _match_id: &str) -> Result<Option<MatchMetrics>, StoreError> {
        if self.fail_summary {
            return Err(store_error("summary query failed"));
        }
        Ok(self.metrics.clone())
    }

    async fn events_per_minute(&self, _match_id: &str) -> Result<Vec<EventsPerMinute>, StoreError> {
        if self.fail_per_minute {
            return Err(store_error("per-minute query failed"));
        }
        Ok(self.per_minute.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_ping {
            return Err(store_error("connection refused"));
        }
        Ok(())
    }
}

pub struct TestHarness {
    pub publisher: Arc<MockPublisher>,
    app: Router,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mocks(MockPublisher::default(), MockRepository::default())
    }

    pub fn with_repository(repository: MockRepository) -> Self {
        Self::with_mocks(MockPublisher::default(), repository)
    }

    pub fn with_mocks(publisher: MockPublisher, repository: MockRepository) -> Self {
        let publisher = Arc::new(publisher);
        let app = router(FixedClock {}, publisher.clone(), repository, false);
        TestHarness { publisher, app }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post(&self, uri: &str, body: String) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
