use serde::Deserialize;

/// One physical connection point on the Fluvius side and the Opinum series it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeteringPoint {
    pub ean: String,
    pub variable_id: i64,
}

impl MeteringPoint {
    pub fn new(ean: impl Into<String>, variable_id: i64) -> Self {
        Self {
            ean: ean.into(),
            variable_id,
        }
    }
}
