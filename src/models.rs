use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

/// One water-level observation reported by a device. Immutable once received.
#[derive(Clone, Debug, PartialEq)]
pub struct WaterSample {
    /// Measured water level in centimetres.
    pub level_cm: f64,
    /// Backend insert timestamp of the reading.
    pub taken_at: SystemTime,
}

impl WaterSample {
    pub fn new(level_cm: f64, taken_at: SystemTime) -> Self {
        Self { level_cm, taken_at }
    }
}
