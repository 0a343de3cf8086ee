//! Normalization of Fluvius reading payloads into canonical batches.
//!
//! Fluvius has served three layouts for the same quarter-hour data. The
//! layout is detected structurally on every payload, then a per-shape rule
//! set tells the shared entry walker where the timestamp and value live.

use meter_domain::{CanonicalReading, ReadingBatch};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use time_tz::{timezones, OffsetDateTimeExt, TimeZone, Tz};

/// Undecoded JSON document as returned by the readings endpoint.
pub type RawPayload = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `electricityMeters[].quarterHourlyEnergy[]`, `timestampStart`, `measurement[0].offtakeValue`.
    ElectricityMeters,
    /// `headpoint.physicalMeters[].quarterHourlyEnergy[]`, `start`, `measurements[0].offtake…`.
    HeadpointMeters,
    /// `headpoint.quarterHourlyEnergy[]` with the same entry layout as `HeadpointMeters`.
    HeadpointEntries,
}

struct EntryRules {
    timestamp_field: &'static str,
    measurements_field: &'static str,
    value_paths: &'static [&'static [&'static str]],
}

const LEGACY_RULES: EntryRules = EntryRules {
    timestamp_field: "timestampStart",
    measurements_field: "measurement",
    value_paths: &[&["offtakeValue"]],
};

const HEADPOINT_RULES: EntryRules = EntryRules {
    timestamp_field: "start",
    measurements_field: "measurements",
    value_paths: &[&["offtake", "total", "value"], &["offtake", "value"]],
};

const QUARTER_HOURS: &str = "quarterHourlyEnergy";

impl PayloadShape {
    const PROBE_ORDER: [PayloadShape; 3] = [
        Self::ElectricityMeters,
        Self::HeadpointMeters,
        Self::HeadpointEntries,
    ];

    fn rules(self) -> &'static EntryRules {
        match self {
            Self::ElectricityMeters => &LEGACY_RULES,
            Self::HeadpointMeters | Self::HeadpointEntries => &HEADPOINT_RULES,
        }
    }

    /// The top-level collection this shape is recognized by.
    fn collection(self, root: &Value) -> Option<&Vec<Value>> {
        let node = match self {
            Self::ElectricityMeters => root.get("electricityMeters"),
            Self::HeadpointMeters => root.get("headpoint").and_then(|h| h.get("physicalMeters")),
            Self::HeadpointEntries => root.get("headpoint").and_then(|h| h.get(QUARTER_HOURS)),
        };
        node.and_then(Value::as_array)
    }

    /// Quarter-hour entries in payload order, flattened across meters where the shape has them.
    fn entries(self, root: &Value) -> Vec<&Value> {
        let Some(collection) = self.collection(root) else {
            return Vec::new();
        };
        match self {
            Self::HeadpointEntries => collection.iter().collect(),
            Self::ElectricityMeters | Self::HeadpointMeters => collection
                .iter()
                .filter_map(|meter| meter.get(QUARTER_HOURS).and_then(Value::as_array))
                .flatten()
                .collect(),
        }
    }
}

/// Readings are wrapped in a `data` envelope; bare documents are probed as-is.
fn payload_root(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(data) if data.is_object() => data,
        _ => payload,
    }
}

/// Probes A, then B, then C. A shape with a non-empty collection wins; if
/// every present collection is empty the first present shape is reported.
pub fn detect_shape(payload: &RawPayload) -> Option<PayloadShape> {
    let root = payload_root(payload);
    let mut first_present = None;
    for shape in PayloadShape::PROBE_ORDER {
        if let Some(collection) = shape.collection(root) {
            if !collection.is_empty() {
                return Some(shape);
            }
            first_present.get_or_insert(shape);
        }
    }
    first_present
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    MissingTimestamp,
    MissingMeasurement,
    MissingValue,
    BadTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// `None` when no known collection path exists in the payload.
    pub shape: Option<PayloadShape>,
    pub batch: ReadingBatch,
    pub skipped: usize,
}

/// Converts raw payloads to batches stamped in civil time of `zone`.
#[derive(Clone, Copy)]
pub struct Normalizer {
    zone: &'static Tz,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("zone", &self.zone.name())
            .finish()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            zone: timezones::db::europe::BRUSSELS,
        }
    }
}

impl Normalizer {
    pub fn new(zone: &'static Tz) -> Self {
        Self { zone }
    }

    /// Never fails: an unusable payload yields an empty batch.
    pub fn normalize(&self, payload: &RawPayload, variable_id: i64) -> ReadingBatch {
        self.normalize_detailed(payload, variable_id).batch
    }

    pub fn normalize_detailed(&self, payload: &RawPayload, variable_id: i64) -> Normalized {
        let Some(shape) = detect_shape(payload) else {
            return Normalized {
                shape: None,
                batch: ReadingBatch::empty(variable_id),
                skipped: 0,
            };
        };

        let rules = shape.rules();
        let mut readings = Vec::new();
        let mut skipped = 0;
        for entry in shape.entries(payload_root(payload)) {
            match self.extract(rules, entry) {
                Ok(reading) => readings.push(reading),
                Err(reason) => {
                    skipped += 1;
                    tracing::debug!(?shape, ?reason, "skipping quarter-hour entry");
                }
            }
        }
        if skipped > 0 {
            metrics::counter!("normalize_entries_skipped_total").increment(skipped as u64);
        }

        Normalized {
            shape: Some(shape),
            batch: ReadingBatch::new(variable_id, readings),
            skipped,
        }
    }

    fn extract(&self, rules: &EntryRules, entry: &Value) -> Result<CanonicalReading, SkipReason> {
        let timestamp = entry
            .get(rules.timestamp_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(SkipReason::MissingTimestamp)?;

        // Only the first measurement is meaningful for quarter-hour offtake.
        let measurement = entry
            .get(rules.measurements_field)
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .ok_or(SkipReason::MissingMeasurement)?;

        let value = rules
            .value_paths
            .iter()
            .find_map(|path| lookup(measurement, path).and_then(Value::as_f64))
            .ok_or(SkipReason::MissingValue)?;

        let at = OffsetDateTime::parse(timestamp, &Rfc3339).map_err(|_| SkipReason::BadTimestamp)?;
        CanonicalReading::new(at.to_timezone(self.zone), value).map_err(|_| SkipReason::MissingValue)
    }
}

fn lookup<'a>(node: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(node, |n, key| n.get(*key))
}
