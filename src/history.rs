//! Statistics over a window of historical samples.
//!
//! The history view fetches a 24-hour window (`SampleSource::fetch_since`)
//! and reduces it here. Pure function over plain data; no source or storage
//! dependencies.

use crate::derivation::{LEAK_DROP_THRESHOLD_CM, LEAK_WINDOW_HOURS};
use crate::error::GeometryError;
use crate::geometry::TankGeometry;
use crate::models::WaterSample;

/// Aggregates over a time-ordered window of samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryStats {
    /// Samples that contributed; non-increasing-timestamp pairs are skipped
    /// under the same rule the live engine applies.
    pub sample_count: u32,
    pub min_level_cm: f64,
    pub max_level_cm: f64,
    pub avg_level_cm: f64,
    /// First accepted level minus last. Positive means the tank drained
    /// over the window, matching the usage-rate sign convention.
    pub net_level_change_cm: f64,
    /// Total volume lost across draining intervals.
    pub drained_volume_l: f64,
    /// Total volume gained across refilling intervals.
    pub refilled_volume_l: f64,
    /// Fastest draining rate seen between consecutive accepted samples.
    pub peak_usage_rate_l_h: f64,
    /// Consecutive pairs that met the leak rule.
    pub leak_events: u32,
}

impl HistoryStats {
    /// Reduce a time-ordered sample window under the given geometry.
    pub fn compute(
        samples: &[WaterSample],
        geometry: &TankGeometry,
    ) -> Result<Self, GeometryError> {
        geometry.validate()?;

        let mut stats = HistoryStats::default();
        let mut prev: Option<&WaterSample> = None;
        let mut first_level = 0.0;
        let mut last_level = 0.0;
        let mut min_level = f64::MAX;
        let mut max_level = f64::MIN;
        let mut level_sum = 0.0;

        for sample in samples {
            if let Some(previous) = prev {
                let dt_hours = match sample.taken_at.duration_since(previous.taken_at) {
                    Ok(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64() / 3600.0,
                    _ => continue,
                };
                let drop_cm = previous.level_cm - sample.level_cm;
                let volume_delta =
                    geometry.volume_l(previous.level_cm) - geometry.volume_l(sample.level_cm);
                if volume_delta > 0.0 {
                    stats.drained_volume_l += volume_delta;
                } else {
                    stats.refilled_volume_l -= volume_delta;
                }
                let rate = drop_cm / dt_hours;
                if rate > stats.peak_usage_rate_l_h {
                    stats.peak_usage_rate_l_h = rate;
                }
                if drop_cm > LEAK_DROP_THRESHOLD_CM && dt_hours < LEAK_WINDOW_HOURS {
                    stats.leak_events += 1;
                }
            } else {
                first_level = sample.level_cm;
            }

            stats.sample_count += 1;
            min_level = min_level.min(sample.level_cm);
            max_level = max_level.max(sample.level_cm);
            level_sum += sample.level_cm;
            last_level = sample.level_cm;
            prev = Some(sample);
        }

        if stats.sample_count > 0 {
            stats.min_level_cm = min_level;
            stats.max_level_cm = max_level;
            stats.avg_level_cm = level_sum / stats.sample_count as f64;
            stats.net_level_change_cm = first_level - last_level;
        }
        Ok(stats)
    }
}

/// FFI entry point mirroring [`HistoryStats::compute`].
pub fn history_stats(
    samples: Vec<WaterSample>,
    geometry: TankGeometry,
) -> Result<HistoryStats, GeometryError> {
    HistoryStats::compute(&samples, &geometry)
}
