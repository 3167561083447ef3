//! Retry escalation: deciding which events of a failed batch go back to the
//! retry topic and which are terminal, and building the records for both.

use rdkafka::message::{Header, Message, OwnedHeaders, OwnedMessage};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use common_kafka::headers::{
    retry_count, HEADER_EVENT_ID, HEADER_EVENT_TYPE, HEADER_FAILED_AT, HEADER_ORIGINAL_TIMESTAMP,
    HEADER_RETRY_COUNT,
};
use common_kafka::OutboundRecord;
use common_types::{DeadLetter, Event, WireError};

pub const HEADER_REASON: &str = "reason";

pub const DEAD_LETTER_REASON: &str = "max_retries_exceeded_or_permanent_failure";
pub const DECODE_FAILURE_REASON: &str = "decode_error";

/// How a failed batch splits once attempt counters are applied.
/// `retry_events[i]` is the event carried by `retry_records[i]`.
#[derive(Default)]
pub struct EscalationPlan {
    pub retry_events: Vec<Event>,
    pub retry_records: Vec<OutboundRecord>,
    pub dead: Vec<Event>,
}

/// The attempt the record is about to make: its `retry_count` header (absent
/// on records straight off the primary topic) plus one.
pub fn next_attempt(record: &OwnedMessage) -> u8 {
    retry_count(record.headers()).saturating_add(1)
}

/// Splits a failed batch by attempt budget. Events that can still retry get
/// a record with a bumped counter; the rest are terminal.
pub fn plan_escalation(
    events: Vec<Event>,
    records: &[OwnedMessage],
    max_retries: u8,
) -> EscalationPlan {
    let mut plan = EscalationPlan::default();

    for (index, event) in events.into_iter().enumerate() {
        let attempt = records.get(index).map(next_attempt).unwrap_or(1);
        if attempt > max_retries {
            plan.dead.push(event);
            continue;
        }
        match retry_record(&event, attempt) {
            Ok(record) => {
                plan.retry_records.push(record);
                plan.retry_events.push(event);
            }
            Err(err) => {
                warn!(event_id = %event.event_id, "skipping unserializable event for retry: {err}");
            }
        }
    }

    plan
}

/// A re-publish of the original event with its attempt counter bumped.
pub fn retry_record(event: &Event, attempt: u8) -> Result<OutboundRecord, WireError> {
    let payload = event.to_wire()?;
    let event_id = event.event_id.to_string();
    let original_timestamp = rfc3339(event.timestamp);

    let headers = OwnedHeaders::new()
        .insert(Header {
            key: HEADER_EVENT_TYPE,
            value: Some(event.event_type.as_str().as_bytes()),
        })
        .insert(Header {
            key: HEADER_EVENT_ID,
            value: Some(event_id.as_bytes()),
        })
        .insert(Header {
            key: HEADER_RETRY_COUNT,
            value: Some(&[attempt][..]),
        })
        .insert(Header {
            key: HEADER_ORIGINAL_TIMESTAMP,
            value: Some(original_timestamp.as_bytes()),
        });

    Ok(OutboundRecord {
        key: event.match_id.clone(),
        payload,
        headers,
    })
}

/// The terminal envelope for an event that exhausted its retries.
pub fn dead_record(
    event: &Event,
    failed_at: OffsetDateTime,
    reason: &str,
) -> Result<OutboundRecord, WireError> {
    let payload = DeadLetter::wrap(event, failed_at, reason)?;
    let event_id = event.event_id.to_string();
    let failed_at_header = rfc3339(failed_at);

    let headers = OwnedHeaders::new()
        .insert(Header {
            key: HEADER_EVENT_TYPE,
            value: Some(event.event_type.as_str().as_bytes()),
        })
        .insert(Header {
            key: HEADER_EVENT_ID,
            value: Some(event_id.as_bytes()),
        })
        .insert(Header {
            key: HEADER_FAILED_AT,
            value: Some(failed_at_header.as_bytes()),
        });

    Ok(OutboundRecord {
        key: event.match_id.clone(),
        payload,
        headers,
    })
}

/// A dead-letter record for a payload that would not decode: the raw bytes
/// are preserved verbatim so nothing is lost to a codec bug.
pub fn quarantine_record(record: &OwnedMessage, failed_at: OffsetDateTime) -> OutboundRecord {
    let key = record
        .key()
        .map(|key| String::from_utf8_lossy(key).into_owned())
        .unwrap_or_default();
    let failed_at_header = rfc3339(failed_at);

    let headers = OwnedHeaders::new()
        .insert(Header {
            key: HEADER_REASON,
            value: Some(DECODE_FAILURE_REASON.as_bytes()),
        })
        .insert(Header {
            key: HEADER_FAILED_AT,
            value: Some(failed_at_header.as_bytes()),
        });

    OutboundRecord {
        key,
        payload: record.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new())
}
