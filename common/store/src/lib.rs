//! ClickHouse-backed persistence: bulk inserts on the write path and the
//! aggregation queries behind the match metrics endpoint.

use std::time::Instant;

use async_trait::async_trait;
use clickhouse::Row;
use envconfig::Envconfig;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use common_types::{Event, EventsPerMinute, MatchMetrics, PeakEngagement};

const QUERY_DURATION: &str = "clickhouse_query_duration_seconds";
const QUERY_ERRORS: &str = "clickhouse_query_errors_total";
const BATCH_SIZE: &str = "clickhouse_batch_size";
const EVENTS_INSERTED: &str = "clickhouse_events_inserted_total";

const EVENTS_TABLE: &str = "match_events";

#[derive(Envconfig, Clone)]
pub struct ClickHouseConfig {
    #[envconfig(from = "CLICKHOUSE_HOST", default = "localhost")]
    pub clickhouse_host: String,

    #[envconfig(from = "CLICKHOUSE_HTTP_PORT", default = "8123")]
    pub clickhouse_http_port: u16,

    #[envconfig(from = "CLICKHOUSE_DATABASE", default = "default")]
    pub clickhouse_database: String,

    #[envconfig(from = "CLICKHOUSE_USER", default = "default")]
    pub clickhouse_user: String,

    #[envconfig(from = "CLICKHOUSE_PASSWORD", default = "")]
    pub clickhouse_password: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),
}

/// Write-path capability held by the batch consumer.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_batch(&self, events: &[Event]) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read-path capability held by the metrics handler.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn match_metrics(&self, match_id: &str) -> Result<Option<MatchMetrics>, StoreError>;
    async fn events_per_minute(&self, match_id: &str) -> Result<Vec<EventsPerMinute>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Row, Serialize)]
struct EventRow {
    #[serde(with = "clickhouse::serde::uuid")]
    event_id: Uuid,
    match_id: String,
    event_type: String,
    team_id: String,
    player_id: Option<String>,
    metadata: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    timestamp: OffsetDateTime,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        EventRow {
            event_id: event.event_id,
            match_id: event.match_id.clone(),
            event_type: event.event_type.to_string(),
            team_id: event.team_id.to_string(),
            player_id: if event.player_id.is_empty() {
                None
            } else {
                Some(event.player_id.clone())
            },
            metadata: event.metadata_json(),
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct SummaryRow {
    total_events: u64,
    goals: u64,
    yellow_cards: u64,
    red_cards: u64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    first_event_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    last_event_at: OffsetDateTime,
}

#[derive(Debug, Row, Deserialize)]
struct ByTypeRow {
    event_type: String,
    event_count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct PerMinuteRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    minute: OffsetDateTime,
    event_type: String,
    event_count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct PeakRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    minute: OffsetDateTime,
    event_count: u64,
}

pub struct ClickHouseStore {
    client: clickhouse::Client,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let url = format!(
            "http://{}:{}",
            config.clickhouse_host, config.clickhouse_http_port
        );
        let mut client = clickhouse::Client::default()
            .with_url(&url)
            .with_database(&config.clickhouse_database)
            .with_user(&config.clickhouse_user);

        if !config.clickhouse_password.is_empty() {
            client = client.with_password(&config.clickhouse_password);
        }

        ClickHouseStore { client }
    }

    fn observe(operation: &'static str, start: Instant) {
        histogram!(QUERY_DURATION, "operation" => operation).record(start.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl EventStore for ClickHouseStore {
    async fn insert_batch(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let result: Result<(), clickhouse::error::Error> = async {
            let mut insert = self.client.insert(EVENTS_TABLE)?;
            for event in events {
                insert.write(&EventRow::from(event)).await?;
            }
            insert.end().await
        }
        .await;

        Self::observe("insert_batch", start);
        histogram!(BATCH_SIZE).record(events.len() as f64);

        match result {
            Ok(()) => {
                counter!(EVENTS_INSERTED).increment(events.len() as u64);
                debug!(batch_size = events.len(), "inserted batch");
                Ok(())
            }
            Err(err) => {
                counter!(QUERY_ERRORS, "operation" => "insert_batch").increment(1);
                Err(err.into())
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsRepository for ClickHouseStore {
    async fn match_metrics(&self, match_id: &str) -> Result<Option<MatchMetrics>, StoreError> {
        let start = Instant::now();

        let summary = self
            .client
            .query(
                "SELECT \
                     count(*) AS total_events, \
                     countIf(event_type = 'goal') AS goals, \
                     countIf(event_type = 'yellow_card') AS yellow_cards, \
                     countIf(event_type = 'red_card') AS red_cards, \
                     min(timestamp) AS first_event_at, \
                     max(timestamp) AS last_event_at \
                 FROM match_events \
                 WHERE match_id = ?",
            )
            .bind(match_id)
            .fetch_one::<SummaryRow>()
            .await
            .map_err(|err| {
                counter!(QUERY_ERRORS, "operation" => "match_metrics").increment(1);
                Self::observe("match_metrics", start);
                err
            })?;

        if summary.total_events == 0 {
            Self::observe("match_metrics", start);
            return Ok(None);
        }

        let mut metrics = MatchMetrics::new(match_id);
        metrics.total_events = summary.total_events;
        metrics.goals = summary.goals;
        metrics.yellow_cards = summary.yellow_cards;
        metrics.red_cards = summary.red_cards;
        metrics.first_event_at = Some(summary.first_event_at);
        metrics.last_event_at = Some(summary.last_event_at);

        let by_type = self
            .client
            .query(
                "SELECT event_type, count(*) AS event_count \
                 FROM match_events \
                 WHERE match_id = ? \
                 GROUP BY event_type \
                 ORDER BY event_count DESC",
            )
            .bind(match_id)
            .fetch_all::<ByTypeRow>()
            .await
            .map_err(|err| {
                counter!(QUERY_ERRORS, "operation" => "match_metrics_by_type").increment(1);
                Self::observe("match_metrics", start);
                err
            })?;

        for row in by_type {
            metrics.events_by_type.insert(row.event_type, row.event_count);
        }

        // Server-side peak; the handler recomputes it from the per-minute
        // breakdown, so a failure here only degrades the fallback.
        match self
            .client
            .query(
                "SELECT toStartOfMinute(timestamp) AS minute, count(*) AS event_count \
                 FROM match_events \
                 WHERE match_id = ? \
                 GROUP BY minute \
                 ORDER BY event_count DESC, minute ASC \
                 LIMIT 1",
            )
            .bind(match_id)
            .fetch_optional::<PeakRow>()
            .await
        {
            Ok(Some(row)) if row.event_count > 0 => {
                metrics.peak_minute = Some(PeakEngagement {
                    minute: row.minute,
                    event_count: row.event_count,
                });
            }
            Ok(_) => {}
            Err(err) => {
                warn!(match_id, "failed to query peak minute: {err}");
            }
        }

        Self::observe("match_metrics", start);
        debug!(match_id, total_events = metrics.total_events, "retrieved match metrics");
        Ok(Some(metrics))
    }

    async fn events_per_minute(&self, match_id: &str) -> Result<Vec<EventsPerMinute>, StoreError> {
        let start = Instant::now();

        let rows = self
            .client
            .query(
                "SELECT toStartOfMinute(timestamp) AS minute, event_type, count(*) AS event_count \
                 FROM match_events \
                 WHERE match_id = ? \
                 GROUP BY minute, event_type \
                 ORDER BY minute ASC, event_type ASC",
            )
            .bind(match_id)
            .fetch_all::<PerMinuteRow>()
            .await
            .map_err(|err| {
                counter!(QUERY_ERRORS, "operation" => "events_per_minute").increment(1);
                Self::observe("events_per_minute", start);
                err
            })?;

        Self::observe("events_per_minute", start);
        Ok(rows
            .into_iter()
            .map(|row| EventsPerMinute {
                minute: row.minute,
                event_type: row.event_type,
                event_count: row.event_count,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.client.query("SELECT 1").execute().await;
        Self::observe("ping", start);

        result.map_err(|err| {
            counter!(QUERY_ERRORS, "operation" => "ping").increment(1);
            err.into()
        })
    }
}
