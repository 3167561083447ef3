use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// The closed set of match actions we accept. Anything else is a
/// validation failure, including case variants of these names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pass,
    Shot,
    Goal,
    Foul,
    YellowCard,
    RedCard,
    Substitution,
    Offside,
    Corner,
    FreeKick,
    Interception,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::Pass,
        EventType::Shot,
        EventType::Goal,
        EventType::Foul,
        EventType::YellowCard,
        EventType::RedCard,
        EventType::Substitution,
        EventType::Offside,
        EventType::Corner,
        EventType::FreeKick,
        EventType::Interception,
    ];

    pub fn parse(value: &str) -> Option<EventType> {
        match value {
            "pass" => Some(EventType::Pass),
            "shot" => Some(EventType::Shot),
            "goal" => Some(EventType::Goal),
            "foul" => Some(EventType::Foul),
            "yellow_card" => Some(EventType::YellowCard),
            "red_card" => Some(EventType::RedCard),
            "substitution" => Some(EventType::Substitution),
            "offside" => Some(EventType::Offside),
            "corner" => Some(EventType::Corner),
            "free_kick" => Some(EventType::FreeKick),
            "interception" => Some(EventType::Interception),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Pass => "pass",
            EventType::Shot => "shot",
            EventType::Goal => "goal",
            EventType::Foul => "foul",
            EventType::YellowCard => "yellow_card",
            EventType::RedCard => "red_card",
            EventType::Substitution => "substitution",
            EventType::Offside => "offside",
            EventType::Corner => "corner",
            EventType::FreeKick => "free_kick",
            EventType::Interception => "interception",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field validation failure, surfaced as 400 with the offending field name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        ValidationError { field, message }
    }
}

/// The incoming JSON shape for `POST /api/events`. All fields are defaulted
/// so a missing field fails its own validation rule rather than JSON parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub match_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EventRequest {
    /// Validates the request and converts it into a domain [`Event`].
    /// Validation is pure and ordered; the first failing field wins.
    pub fn parse(&self) -> Result<Event, ValidationError> {
        let event_id = Uuid::parse_str(&self.event_id)
            .map_err(|_| ValidationError::new("eventId", "must be a valid UUID"))?;

        if self.match_id.is_empty() {
            return Err(ValidationError::new("matchId", "is required"));
        }

        let event_type = EventType::parse(&self.event_type)
            .ok_or_else(|| ValidationError::new("eventType", "must be a valid event type"))?;

        let timestamp = OffsetDateTime::parse(&self.timestamp, &Rfc3339)
            .map_err(|_| ValidationError::new("timestamp", "must be a valid RFC3339 timestamp"))?;

        if self.team_id != 1 && self.team_id != 2 {
            return Err(ValidationError::new("teamId", "must be 1 or 2"));
        }

        Ok(Event {
            event_id,
            match_id: self.match_id.clone(),
            event_type,
            timestamp,
            team_id: self.team_id,
            player_id: self.player_id.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

/// A validated match event. Short-lived in memory: one hop from the HTTP
/// layer to Kafka, and one hop from Kafka through a consumer batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: Uuid,
    pub match_id: String,
    pub event_type: EventType,
    pub timestamp: OffsetDateTime,
    pub team_id: i64,
    pub player_id: String,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to decode event: {0}")]
    Json(#[from] serde_json::Error),
}

/// The serialized form carried on the log. Field names match the external
/// API so a record is readable end to end.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    event_id: Uuid,
    match_id: String,
    event_type: EventType,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    team_id: i64,
    player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl Event {
    /// Metadata as a JSON object string for the store; `{}` when absent.
    pub fn metadata_json(&self) -> String {
        match &self.metadata {
            None => "{}".to_string(),
            Some(map) => serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        let wire = WireEvent {
            event_id: self.event_id,
            match_id: self.match_id.clone(),
            event_type: self.event_type,
            timestamp: self.timestamp,
            team_id: self.team_id,
            player_id: self.player_id.clone(),
            metadata: self.metadata.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decodes a log record value. The RFC3339 parser accepts both the
    /// sub-second precision we emit and plain seconds from older producers.
    pub fn from_wire(data: &[u8]) -> Result<Event, WireError> {
        let wire: WireEvent = serde_json::from_slice(data)?;
        Ok(Event {
            event_id: wire.event_id,
            match_id: wire.match_id,
            event_type: wire.event_type,
            timestamp: wire.timestamp,
            team_id: wire.team_id,
            player_id: wire.player_id,
            metadata: wire.metadata,
        })
    }
}

/// Terminal envelope published to the dead-letter topic once an event has
/// exhausted its retries (or could not be re-published at all).
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub failed_at: OffsetDateTime,
    pub reason: String,
    pub event_id: String,
    pub match_id: String,
    pub event_type: String,
}

impl DeadLetter {
    pub fn wrap(
        event: &Event,
        failed_at: OffsetDateTime,
        reason: &str,
    ) -> Result<Vec<u8>, WireError> {
        let raw = event.to_wire()?;
        let envelope = DeadLetter {
            event: serde_json::from_slice(&raw)?,
            failed_at,
            reason: reason.to_string(),
            event_id: event.event_id.to_string(),
            match_id: event.match_id.clone(),
            event_type: event.event_type.to_string(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }
}
