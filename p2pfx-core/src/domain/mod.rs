//! Domain types for p2pfx

pub mod calendar;
pub mod ids;
pub mod record;

pub use calendar::{CalendarFields, ClockFields};
pub use ids::{RunIndex, SourceId};
pub use record::{OfficialQuote, OfficialRate, P2pQuote, P2pRecord, Side, SideError};
