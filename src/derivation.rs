//! Reading-to-metrics derivation.
//!
//! [`DerivationState`] consumes an ordered stream of level readings for one
//! tank and maintains the derived figures the app displays: current level,
//! held volume under the active geometry, instantaneous usage rate, and a
//! latched leak flag. One state exists per (device, geometry) binding; a
//! geometry change starts a fresh state so no rate or leak baseline carries
//! across tank configurations.

use tracing::debug;

use crate::error::GeometryError;
use crate::geometry::TankGeometry;
use crate::models::WaterSample;

// ============================================================================
// Leak Heuristic Tunables
// ============================================================================

/// Level drop (cm) between consecutive readings that qualifies as a leak
/// when it happens inside [`LEAK_WINDOW_HOURS`].
pub const LEAK_DROP_THRESHOLD_CM: f64 = 5.0;

/// Window (hours) within which a qualifying drop latches the leak flag.
/// 10 minutes.
pub const LEAK_WINDOW_HOURS: f64 = 10.0 / 60.0;

/// Derived snapshot exposed to the consumer.
///
/// `Default` is the zero-state in effect before any sample is accepted:
/// level 0, volume 0, rate 0, no leak.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct WaterStatus {
    /// Latest accepted water level (cm).
    pub level_cm: f64,
    /// Volume held at that level under the active geometry. Never negative.
    pub volume_l: f64,
    /// Signed usage rate relative to the previous accepted sample.
    /// Positive while draining; 0 until two samples have been accepted.
    pub usage_rate_l_h: f64,
    /// Latched on the first qualifying drop; never auto-clears for the
    /// lifetime of the binding. Dismissal policy belongs to the consumer.
    pub leak_detected: bool,
}

/// Per-binding derivation state: the active geometry, the last accepted
/// sample, and the current [`WaterStatus`].
#[derive(Debug, Clone)]
pub struct DerivationState {
    geometry: TankGeometry,
    last_sample: Option<WaterSample>,
    status: WaterStatus,
}

impl DerivationState {
    /// Create a fresh state in the zero-state. Refuses invalid geometry.
    pub fn new(geometry: TankGeometry) -> Result<Self, GeometryError> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            last_sample: None,
            status: WaterStatus::default(),
        })
    }

    /// A zero-state copy under the same geometry, for binding teardown.
    pub(crate) fn fresh(&self) -> Self {
        Self {
            geometry: self.geometry.clone(),
            last_sample: None,
            status: WaterStatus::default(),
        }
    }

    pub fn geometry(&self) -> &TankGeometry {
        &self.geometry
    }

    pub fn last_sample(&self) -> Option<&WaterSample> {
        self.last_sample.as_ref()
    }

    pub fn status(&self) -> WaterStatus {
        self.status.clone()
    }

    /// Accept one sample and update the derived figures.
    ///
    /// Returns `false` and leaves the state untouched when the sample's
    /// timestamp is not strictly after the last accepted sample's — the
    /// source delivers at-least-once with no ordering guarantee, and a
    /// non-increasing interval would corrupt the rate and leak computation.
    /// Legitimate late arrivals are lost to the same rule; accepted as an
    /// eventual-consistency trade-off rather than buffering and resorting.
    pub fn ingest(&mut self, sample: WaterSample) -> bool {
        if let Some(prev) = &self.last_sample {
            let dt_hours = match sample.taken_at.duration_since(prev.taken_at) {
                Ok(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64() / 3600.0,
                _ => {
                    debug!(level_cm = sample.level_cm, "dropped out-of-order sample");
                    return false;
                }
            };
            let drop_cm = prev.level_cm - sample.level_cm;
            self.status.usage_rate_l_h = drop_cm / dt_hours;
            if drop_cm > LEAK_DROP_THRESHOLD_CM && dt_hours < LEAK_WINDOW_HOURS {
                self.status.leak_detected = true;
            }
        }
        self.status.level_cm = sample.level_cm;
        self.status.volume_l = self.geometry.volume_l(sample.level_cm);
        self.last_sample = Some(sample);
        true
    }
}
