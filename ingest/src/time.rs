use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Clock seam for the server-side timestamps stamped onto responses, so
/// tests can pin them.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A timestamp as it appears in response bodies. Rfc3339 formatting of a
/// UTC instant cannot realistically fail; fall back to epoch seconds
/// rather than panic on a request path.
pub fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}
