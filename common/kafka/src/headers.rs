//! Record headers carried alongside every event so downstream consumers can
//! filter and escalate without decoding the payload.

use rdkafka::message::{Header, Headers, OwnedHeaders};

use common_types::Event;

pub const HEADER_EVENT_TYPE: &str = "event_type";
pub const HEADER_EVENT_ID: &str = "event_id";
pub const HEADER_RETRY_COUNT: &str = "retry_count";
pub const HEADER_ORIGINAL_TIMESTAMP: &str = "original_timestamp";
pub const HEADER_FAILED_AT: &str = "failed_at";

/// The headers attached to a freshly published event.
pub fn event_headers(event: &Event) -> OwnedHeaders {
    let event_id = event.event_id.to_string();
    OwnedHeaders::new()
        .insert(Header {
            key: HEADER_EVENT_TYPE,
            value: Some(event.event_type.as_str().as_bytes()),
        })
        .insert(Header {
            key: HEADER_EVENT_ID,
            value: Some(event_id.as_bytes()),
        })
}

/// Reads the single-byte `retry_count` header; absent means the record has
/// never been through the retry lane.
pub fn retry_count<H: Headers>(headers: Option<&H>) -> u8 {
    let Some(headers) = headers else {
        return 0;
    };
    for header in headers.iter() {
        if header.key == HEADER_RETRY_COUNT {
            if let Some(&count) = header.value.and_then(|value| value.first()) {
                return count;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::{EventRequest, EventType};

    fn test_event() -> Event {
        EventRequest {
            event_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            match_id: "match-1".to_string(),
            event_type: "corner".to_string(),
            timestamp: "2024-03-01T20:15:30Z".to_string(),
            team_id: 2,
            ..Default::default()
        }
        .parse()
        .unwrap()
    }

    fn header_value(headers: &OwnedHeaders, key: &str) -> Option<Vec<u8>> {
        headers
            .iter()
            .find(|header| header.key == key)
            .and_then(|header| header.value.map(|value| value.to_vec()))
    }

    #[test]
    fn event_headers_carry_type_and_id() {
        let event = test_event();
        let headers = event_headers(&event);

        assert_eq!(
            header_value(&headers, HEADER_EVENT_TYPE),
            Some(EventType::Corner.as_str().as_bytes().to_vec())
        );
        assert_eq!(
            header_value(&headers, HEADER_EVENT_ID),
            Some(event.event_id.to_string().into_bytes())
        );
    }

    #[test]
    fn retry_count_defaults_to_zero() {
        assert_eq!(retry_count::<OwnedHeaders>(None), 0);

        let headers = event_headers(&test_event());
        assert_eq!(retry_count(Some(&headers)), 0);
    }

    #[test]
    fn retry_count_reads_single_byte_header() {
        let headers = OwnedHeaders::new().insert(Header {
            key: HEADER_RETRY_COUNT,
            value: Some(&[2u8][..]),
        });
        assert_eq!(retry_count(Some(&headers)), 2);
    }
}
