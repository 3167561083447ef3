pub mod event;
pub mod metrics;

pub use event::{DeadLetter, Event, EventRequest, EventType, ValidationError, WireError};
pub use metrics::{peak_engagement, EventsPerMinute, MatchMetrics, PeakEngagement};
