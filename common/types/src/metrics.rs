use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Aggregated metrics for a match, the response body for
/// `GET /api/matches/{matchId}/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetrics {
    pub match_id: String,
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub goals: u64,
    pub yellow_cards: u64,
    pub red_cards: u64,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_event_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_event_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_minute: Option<PeakEngagement>,
}

impl MatchMetrics {
    pub fn new(match_id: &str) -> Self {
        MatchMetrics {
            match_id: match_id.to_string(),
            total_events: 0,
            events_by_type: HashMap::new(),
            goals: 0,
            yellow_cards: 0,
            red_cards: 0,
            first_event_at: None,
            last_event_at: None,
            peak_minute: None,
        }
    }
}

/// The minute-aligned window with the highest total event count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakEngagement {
    #[serde(with = "time::serde::rfc3339")]
    pub minute: OffsetDateTime,
    pub event_count: u64,
}

/// One row of the per-minute breakdown used to compute the peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPerMinute {
    #[serde(with = "time::serde::rfc3339")]
    pub minute: OffsetDateTime,
    pub event_type: String,
    pub event_count: u64,
}

/// Sums the per-minute counts across event types and returns the busiest
/// minute. Ties go to the earliest minute so the result is deterministic.
pub fn peak_engagement(per_minute: &[EventsPerMinute]) -> Option<PeakEngagement> {
    let mut totals: HashMap<OffsetDateTime, u64> = HashMap::new();
    for row in per_minute {
        *totals.entry(row.minute).or_insert(0) += row.event_count;
    }

    let mut minutes: Vec<(OffsetDateTime, u64)> = totals.into_iter().collect();
    minutes.sort_by_key(|(minute, _)| *minute);

    let mut peak: Option<PeakEngagement> = None;
    for (minute, event_count) in minutes {
        if event_count == 0 {
            continue;
        }
        match &peak {
            Some(current) if current.event_count >= event_count => {}
            _ => peak = Some(PeakEngagement { minute, event_count }),
        }
    }
    peak
}
