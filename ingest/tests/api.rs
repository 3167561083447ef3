mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use time::macros::datetime;
use uuid::Uuid;

use common::{MockPublisher, MockRepository, TestHarness, FROZEN_TIME};
use common_types::{EventsPerMinute, MatchMetrics, PeakEngagement};
use ingest::api::{ErrorResponse, HealthResponse, IngestResponse, ReadinessResponse};

fn valid_body(event_id: &Uuid) -> String {
    json!({
        "eventId": event_id.to_string(),
        "matchId": "match-123",
        "eventType": "goal",
        "timestamp": "2024-03-01T20:15:30.123Z",
        "teamId": 1,
        "playerId": "player-9",
        "metadata": {"minute": 45}
    })
    .to_string()
}

fn body_with(key: &str, value: Value) -> String {
    let mut body: Value = serde_json::from_str(&valid_body(&Uuid::new_v4())).unwrap();
    body[key] = value;
    body.to_string()
}

#[tokio::test]
async fn valid_event_is_accepted_and_published() {
    let harness = TestHarness::new();
    let event_id = Uuid::new_v4();

    let response = harness.post("/api/events", valid_body(&event_id)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body: IngestResponse = TestHarness::body_json(response).await;
    assert_eq!(body.event_id, event_id.to_string());
    assert_eq!(body.status, "accepted");
    assert_eq!(body.timestamp, FROZEN_TIME);

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_id, event_id);
    assert_eq!(published[0].match_id, "match-123");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let harness = TestHarness::new();

    for body in ["not json", "", "[1, 2"] {
        let response = harness.post("/api/events", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body:?}");
    }
    assert!(harness.publisher.published().is_empty());
}

#[tokio::test]
async fn invalid_event_id_names_the_field() {
    let harness = TestHarness::new();

    let response = harness
        .post("/api/events", body_with("eventId", json!("bad-uuid")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = TestHarness::body_json(response).await;
    assert_eq!(body.field.as_deref(), Some("eventId"));
}

#[tokio::test]
async fn empty_match_id_names_the_field() {
    let harness = TestHarness::new();

    let response = harness
        .post("/api/events", body_with("matchId", json!("")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = TestHarness::body_json(response).await;
    assert_eq!(body.field.as_deref(), Some("matchId"));
}

#[tokio::test]
async fn unknown_event_types_name_the_field() {
    let harness = TestHarness::new();

    for bad in ["GOAL", "Goal", "throw_in"] {
        let response = harness
            .post("/api/events", body_with("eventType", json!(bad)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");

        let body: ErrorResponse = TestHarness::body_json(response).await;
        assert_eq!(body.field.as_deref(), Some("eventType"), "{bad}");
    }
}

#[tokio::test]
async fn invalid_timestamps_name_the_field() {
    let harness = TestHarness::new();

    for bad in ["invalid-date", "2021-01-01", "1609459200"] {
        let response = harness
            .post("/api/events", body_with("timestamp", json!(bad)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");

        let body: ErrorResponse = TestHarness::body_json(response).await;
        assert_eq!(body.field.as_deref(), Some("timestamp"), "{bad}");
    }
}

#[tokio::test]
async fn out_of_range_team_ids_name_the_field() {
    let harness = TestHarness::new();

    for bad in [0, 3, -1] {
        let response = harness
            .post("/api/events", body_with("teamId", json!(bad)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");

        let body: ErrorResponse = TestHarness::body_json(response).await;
        assert_eq!(body.field.as_deref(), Some("teamId"), "{bad}");
    }
}

#[tokio::test]
async fn publish_failure_returns_503_without_buffering() {
    let harness = TestHarness::with_mocks(MockPublisher::failing(), MockRepository::default());

    let response = harness
        .post("/api/events", valid_body(&Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: ErrorResponse = TestHarness::body_json(response).await;
    assert_eq!(body.error, "Service Unavailable");
    assert!(harness.publisher.published().is_empty());
}

fn sample_metrics() -> MatchMetrics {
    let mut metrics = MatchMetrics::new("match-123");
    metrics.total_events = 11;
    metrics.goals = 2;
    metrics.yellow_cards = 1;
    metrics.red_cards = 0;
    metrics.events_by_type.insert("pass".to_string(), 8);
    metrics.events_by_type.insert("goal".to_string(), 2);
    metrics.events_by_type.insert("yellow_card".to_string(), 1);
    metrics.first_event_at = Some(datetime!(2024-03-01 20:00:00 UTC));
    metrics.last_event_at = Some(datetime!(2024-03-01 21:45:00 UTC));
    metrics
}

#[tokio::test]
async fn match_metrics_computes_peak_from_per_minute_breakdown() {
    let peak_minute = datetime!(2024-03-01 20:15:00 UTC);
    let quieter_minute = datetime!(2024-03-01 20:16:00 UTC);
    let repository = MockRepository {
        metrics: Some(sample_metrics()),
        per_minute: vec![
            EventsPerMinute {
                minute: peak_minute,
                event_type: "pass".to_string(),
                event_count: 6,
            },
            EventsPerMinute {
                minute: peak_minute,
                event_type: "goal".to_string(),
                event_count: 2,
            },
            EventsPerMinute {
                minute: quieter_minute,
                event_type: "pass".to_string(),
                event_count: 3,
            },
        ],
        ..Default::default()
    };
    let harness = TestHarness::with_repository(repository);

    let response = harness.get("/api/matches/match-123/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: MatchMetrics = TestHarness::body_json(response).await;
    assert_eq!(body.total_events, 11);
    assert_eq!(body.events_by_type["pass"], 8);
    assert_eq!(
        body.peak_minute,
        Some(PeakEngagement {
            minute: peak_minute,
            event_count: 8,
        })
    );
}

#[tokio::test]
async fn unknown_match_returns_404() {
    let harness = TestHarness::with_repository(MockRepository::default());

    let response = harness.get("/api/matches/nope/metrics").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn summary_query_failure_returns_500() {
    let repository = MockRepository {
        fail_summary: true,
        ..Default::default()
    };
    let harness = TestHarness::with_repository(repository);

    let response = harness.get("/api/matches/match-123/metrics").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn per_minute_failure_degrades_to_summary() {
    let mut metrics = sample_metrics();
    metrics.peak_minute = Some(PeakEngagement {
        minute: datetime!(2024-03-01 20:15:00 UTC),
        event_count: 8,
    });
    let repository = MockRepository {
        metrics: Some(metrics),
        fail_per_minute: true,
        ..Default::default()
    };
    let harness = TestHarness::with_repository(repository);

    let response = harness.get("/api/matches/match-123/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    // The repository-computed peak survives when the breakdown is unavailable.
    let body: MatchMetrics = TestHarness::body_json(response).await;
    assert_eq!(body.total_events, 11);
    assert_eq!(body.peak_minute.unwrap().event_count, 8);
}

#[tokio::test]
async fn health_is_always_200() {
    let harness = TestHarness::new();

    let response = harness.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: HealthResponse = TestHarness::body_json(response).await;
    assert_eq!(body.status, "healthy");
    assert_eq!(body.timestamp, FROZEN_TIME);
}

#[tokio::test]
async fn readiness_reflects_store_health() {
    let harness = TestHarness::new();
    let response = harness.get("/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ReadinessResponse = TestHarness::body_json(response).await;
    assert_eq!(body.status, "ready");
    assert_eq!(body.checks["clickhouse"], "healthy");

    let repository = MockRepository {
        fail_ping: true,
        ..Default::default()
    };
    let harness = TestHarness::with_repository(repository);
    let response = harness.get("/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: ReadinessResponse = TestHarness::body_json(response).await;
    assert_eq!(body.status, "not ready");
    assert!(body.checks["clickhouse"].starts_with("unhealthy:"));
}
