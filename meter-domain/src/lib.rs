pub mod domain;

pub use domain::{CanonicalReading, DomainError, MeteringPoint, ReadingBatch, TimeWindow};
