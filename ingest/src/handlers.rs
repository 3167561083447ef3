use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use metrics::counter;
use tracing::{error, instrument, warn};

use common_types::{peak_engagement, EventRequest, MatchMetrics, ValidationError};

use crate::api::{ApiError, HealthResponse, IngestResponse, ReadinessResponse};
use crate::router;
use crate::time::rfc3339;

const EVENTS_INGESTED: &str = "events_ingested_total";
const PRODUCE_ERRORS: &str = "kafka_produce_errors_total";

/// `POST /api/events`: validate, publish synchronously, acknowledge with 202
/// only once the record is durable on the primary topic.
#[instrument(skip_all, fields(event_id, match_id, event_type))]
pub async fn ingest_event(
    state: State<router::State>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let request: EventRequest = serde_json::from_slice(&body)?;
    let event = request.parse()?;

    let span = tracing::Span::current();
    span.record("event_id", event.event_id.to_string().as_str());
    span.record("match_id", event.match_id.as_str());
    span.record("event_type", event.event_type.as_str());

    if let Err(err) = state.publisher.publish(&event).await {
        counter!(PRODUCE_ERRORS).increment(1);
        error!("failed to queue event: {err}");
        return Err(ApiError::PublishFailed);
    }

    counter!(EVENTS_INGESTED, "event_type" => event.event_type.as_str()).increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            event_id: event.event_id.to_string(),
            status: "accepted".to_string(),
            timestamp: rfc3339(state.clock.now()),
        }),
    ))
}

/// `GET /api/matches/{matchId}/metrics`: summary plus the engagement peak
/// recomputed from the per-minute breakdown. A failed per-minute query
/// degrades to the summary (with whatever peak the repository produced).
pub async fn match_metrics(
    state: State<router::State>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchMetrics>, ApiError> {
    if match_id.is_empty() {
        return Err(ValidationError::new("matchId", "is required").into());
    }

    let mut metrics = match state.repository.match_metrics(&match_id).await {
        Ok(Some(metrics)) => metrics,
        Ok(None) => return Err(ApiError::NotFound),
        Err(err) => {
            error!(%match_id, "failed to fetch match metrics: {err}");
            return Err(ApiError::QueryFailed);
        }
    };

    match state.repository.events_per_minute(&match_id).await {
        Ok(per_minute) => metrics.peak_minute = peak_engagement(&per_minute),
        Err(err) => {
            warn!(%match_id, "per-minute breakdown failed, serving summary: {err}");
        }
    }

    Ok(Json(metrics))
}

/// `GET /health`: the process is up.
pub async fn health(state: State<router::State>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: rfc3339(state.clock.now()),
    })
}

/// `GET /ready`: the process can serve traffic, which requires the store.
pub async fn readiness(
    state: State<router::State>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let mut checks = HashMap::new();

    match state.repository.ping().await {
        Ok(()) => {
            checks.insert("clickhouse".to_string(), "healthy".to_string());
            Ok(Json(ReadinessResponse {
                status: "ready".to_string(),
                timestamp: rfc3339(state.clock.now()),
                checks,
            }))
        }
        Err(err) => {
            checks.insert("clickhouse".to_string(), format!("unhealthy: {err}"));
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not ready".to_string(),
                    timestamp: rfc3339(state.clock.now()),
                    checks,
                }),
            ))
        }
    }
}
