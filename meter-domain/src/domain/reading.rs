use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::DomainError;

/// A single quarter-hour value stamped with civil time and its explicit UTC offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalReading {
    timestamp: String,
    value: f64,
}

impl CanonicalReading {
    /// Builds a reading from an already zone-adjusted instant.
    ///
    /// The offset carried by `at` is rendered verbatim, so callers decide the
    /// reporting zone before constructing the reading.
    pub fn new(at: OffsetDateTime, value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() {
            return Err(DomainError::NonFiniteValue(value));
        }
        let timestamp = at
            .format(&Rfc3339)
            .map_err(|e| DomainError::Format(e.to_string()))?;
        Ok(Self { timestamp, value })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Ordered readings for one Opinum variable, in the order the source delivered them.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBatch {
    variable_id: i64,
    readings: Vec<CanonicalReading>,
}

impl ReadingBatch {
    pub fn new(variable_id: i64, readings: Vec<CanonicalReading>) -> Self {
        Self {
            variable_id,
            readings,
        }
    }

    pub fn empty(variable_id: i64) -> Self {
        Self::new(variable_id, Vec::new())
    }

    pub fn variable_id(&self) -> i64 {
        self.variable_id
    }

    pub fn readings(&self) -> &[CanonicalReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// First and last timestamps, if any readings are present.
    pub fn span(&self) -> Option<(&str, &str)> {
        match (self.readings.first(), self.readings.last()) {
            (Some(first), Some(last)) => Some((first.timestamp(), last.timestamp())),
            _ => None,
        }
    }
}
