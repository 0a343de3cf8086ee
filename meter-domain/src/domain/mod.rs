mod metering_point;
mod reading;
mod window;

pub use metering_point::MeteringPoint;
pub use reading::{CanonicalReading, ReadingBatch};
pub use window::TimeWindow;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("window start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },
    #[error("first day {first} is after last day {last}")]
    InvertedDays { first: String, last: String },
    #[error("local midnight of {0} does not exist in the requested zone")]
    NonexistentMidnight(String),
    #[error("date {0} has no following day")]
    EndOfCalendar(String),
    #[error("reading value {0} is not finite")]
    NonFiniteValue(f64),
    #[error("timestamp formatting failed: {0}")]
    Format(String),
}
