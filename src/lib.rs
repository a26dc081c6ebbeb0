pub mod calendar;
pub mod config;
pub mod error;
pub mod feed;
pub mod ical_bridge;
pub mod server;

pub use calendar::event::{EventOccurrence, LogicalEvent};
pub use config::IngestOptions;
pub use error::IngestError;
pub use ical_bridge::{parse_ical, CalendarParser, ParseOutcome};
