//! Tank monitor: one live (device, geometry) binding over a sample source.
//!
//! `start` fetches the latest reading, then subscribes for live inserts;
//! every accepted sample flows through one [`DerivationState`] transition.
//! Changing the geometry tears the binding down and starts a fresh one —
//! no rate baseline or leak latch survives a tank reconfiguration. `stop`
//! (and `Drop`) release the subscription unconditionally.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::derivation::{DerivationState, WaterStatus};
use crate::error::GeometryError;
use crate::geometry::TankGeometry;
use crate::models::DeviceId;
use crate::source::{SampleSink, SampleSource, SourceError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("sample source: {0}")]
    Source(#[from] SourceError),
}

/// Consumer callback; invoked with a fresh snapshot after every accepted
/// sample and after a geometry reset. Never called under an internal lock.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, status: WaterStatus);
}

struct Inner {
    geometry: TankGeometry,
    state: Arc<Mutex<DerivationState>>,
    subscription: Option<crate::source::SubscriptionHandle>,
}

pub struct TankMonitor {
    source: Arc<dyn SampleSource>,
    device_id: DeviceId,
    observer: Arc<Mutex<Option<Arc<dyn StatusObserver>>>>,
    inner: Mutex<Inner>,
}

impl TankMonitor {
    /// Create a stopped monitor. Refuses invalid geometry.
    pub fn new(
        source: Arc<dyn SampleSource>,
        device_id: DeviceId,
        geometry: TankGeometry,
    ) -> Result<Self, GeometryError> {
        let state = DerivationState::new(geometry.clone())?;
        Ok(Self {
            source,
            device_id,
            observer: Arc::new(Mutex::new(None)),
            inner: Mutex::new(Inner {
                geometry,
                state: Arc::new(Mutex::new(state)),
                subscription: None,
            }),
        })
    }

    /// Fetch the latest sample and begin accepting live inserts.
    ///
    /// Idempotent while running. A failed initial fetch degrades to the
    /// zero-state and the subscription is still attempted; a failed
    /// subscribe is returned and leaves the monitor stopped with the
    /// zero-state intact. Retry policy belongs to the caller.
    pub fn start(&self) -> Result<(), MonitorError> {
        let status = {
            let mut inner = self.inner.lock();
            if inner.subscription.is_some() {
                return Ok(());
            }
            self.bind(&mut inner)?
        };
        if let Some(status) = status {
            self.notify(status);
        }
        Ok(())
    }

    /// Current derived snapshot; the zero-state when stopped or before any
    /// accepted sample.
    pub fn status(&self) -> WaterStatus {
        self.inner.lock().state.lock().status()
    }

    pub fn set_observer(&self, observer: Arc<dyn StatusObserver>) {
        *self.observer.lock() = Some(observer);
    }

    /// Apply a new tank configuration.
    ///
    /// An equal geometry is a no-op. A different one discards all derived
    /// state; if the monitor was running, the fetch-then-subscribe sequence
    /// re-runs under the new geometry so level and volume repopulate
    /// immediately.
    pub fn set_geometry(&self, geometry: TankGeometry) -> Result<(), MonitorError> {
        geometry.validate()?;
        let status = {
            let mut inner = self.inner.lock();
            if geometry == inner.geometry {
                return Ok(());
            }
            let was_running = inner.subscription.is_some();
            self.teardown(&mut inner);
            inner.geometry = geometry.clone();
            inner.state = Arc::new(Mutex::new(DerivationState::new(geometry)?));
            if was_running {
                self.bind(&mut inner)?.unwrap_or_default()
            } else {
                WaterStatus::default()
            }
        };
        self.notify(status);
        Ok(())
    }

    /// Release the subscription and discard derived state. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        self.teardown(&mut inner);
    }

    fn bind(&self, inner: &mut Inner) -> Result<Option<WaterStatus>, MonitorError> {
        let initial = match self.source.fetch_latest(&self.device_id) {
            Ok(sample) => sample,
            Err(err) => {
                warn!(
                    device = %self.device_id.0,
                    error = %err,
                    "initial fetch failed, staying at zero-state"
                );
                None
            }
        };
        let sink = self.make_sink(&inner.state);
        let handle = self.source.subscribe(&self.device_id, sink)?;
        inner.subscription = Some(handle);

        Ok(initial.and_then(|sample| {
            let mut state = inner.state.lock();
            state.ingest(sample).then(|| state.status())
        }))
    }

    fn make_sink(&self, state: &Arc<Mutex<DerivationState>>) -> SampleSink {
        // Weak: deliveries addressed to a torn-down binding find their state
        // gone and cannot contaminate a newer one.
        let state = Arc::downgrade(state);
        let observer = Arc::clone(&self.observer);
        Box::new(move |sample| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let status = {
                let mut state = state.lock();
                state.ingest(sample).then(|| state.status())
            };
            if let Some(status) = status {
                let observer = observer.lock().clone();
                if let Some(observer) = observer {
                    observer.status_changed(status);
                }
            }
        })
    }

    fn teardown(&self, inner: &mut Inner) {
        if let Some(handle) = inner.subscription.take() {
            self.source.unsubscribe(handle);
            debug!(device = %self.device_id.0, "released sample subscription");
        }
        // Replacing the Arc orphans any in-flight deliveries on the old one.
        let fresh = inner.state.lock().fresh();
        inner.state = Arc::new(Mutex::new(fresh));
    }

    fn notify(&self, status: WaterStatus) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.status_changed(status);
        }
    }
}

impl Drop for TankMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaterSample;
    use crate::source_mock::MockSampleSource;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn at_minutes(min: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(min * 60)
    }

    fn device() -> DeviceId {
        DeviceId("tank-1".to_string())
    }

    fn geometry() -> TankGeometry {
        TankGeometry::cubical(100.0, Some(100.0))
    }

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<WaterStatus>>,
    }

    impl StatusObserver for Recorder {
        fn status_changed(&self, status: WaterStatus) {
            self.statuses.lock().push(status);
        }
    }

    fn monitor_with(source: &Arc<MockSampleSource>) -> TankMonitor {
        TankMonitor::new(
            Arc::clone(source) as Arc<dyn SampleSource>,
            device(),
            geometry(),
        )
        .unwrap()
    }

    #[test]
    fn test_start_fetches_initial_sample() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![
                WaterSample::new(50.0, at_minutes(10)),
                WaterSample::new(60.0, at_minutes(5)),
            ],
        ));
        let monitor = monitor_with(&source);
        monitor.start().unwrap();

        let status = monitor.status();
        assert_eq!(status.level_cm, 50.0);
        assert_eq!(status.volume_l, 500_000.0);
        assert_eq!(status.usage_rate_l_h, 0.0);
        assert_eq!(source.subscription_count(), 1);
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let source = Arc::new(MockSampleSource::new());
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert_eq!(source.subscription_count(), 1);
    }

    #[test]
    fn test_live_sample_updates_rate_and_latches_leak() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        let monitor = monitor_with(&source);
        let recorder = Arc::new(Recorder::default());
        monitor.set_observer(Arc::clone(&recorder) as Arc<dyn StatusObserver>);
        monitor.start().unwrap();

        source.publish(&device(), WaterSample::new(44.0, at_minutes(5)));

        let status = monitor.status();
        assert_eq!(status.level_cm, 44.0);
        assert_eq!(status.volume_l, 440_000.0);
        assert!((status.usage_rate_l_h - 72.0).abs() < 1e-9);
        assert!(status.leak_detected);

        let seen = recorder.statuses.lock();
        assert_eq!(seen.last().unwrap(), &status);
    }

    #[test]
    fn test_out_of_order_delivery_is_ignored() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(10))],
        ));
        let monitor = monitor_with(&source);
        let recorder = Arc::new(Recorder::default());
        monitor.set_observer(Arc::clone(&recorder) as Arc<dyn StatusObserver>);
        monitor.start().unwrap();
        let before = monitor.status();

        // Duplicate, then an older reading.
        source.publish(&device(), WaterSample::new(30.0, at_minutes(10)));
        source.publish(&device(), WaterSample::new(70.0, at_minutes(2)));

        assert_eq!(monitor.status(), before);
        assert!(recorder.statuses.lock().is_empty());
    }

    #[test]
    fn test_fetch_failure_degrades_to_zero_state() {
        let source = Arc::new(MockSampleSource::new());
        source.set_fail_fetch(true);
        let monitor = monitor_with(&source);
        monitor.start().unwrap();

        assert_eq!(monitor.status(), WaterStatus::default());
        // Still subscribed: live data resumes without a restart.
        assert_eq!(source.subscription_count(), 1);

        source.set_fail_fetch(false);
        source.publish(&device(), WaterSample::new(25.0, at_minutes(1)));
        assert_eq!(monitor.status().level_cm, 25.0);
    }

    #[test]
    fn test_subscribe_failure_leaves_monitor_stopped() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        source.set_fail_subscribe(true);
        let monitor = monitor_with(&source);

        assert!(matches!(
            monitor.start(),
            Err(MonitorError::Source(SourceError::Unavailable(_)))
        ));
        assert_eq!(monitor.status(), WaterStatus::default());
        assert_eq!(source.subscription_count(), 0);
    }

    #[test]
    fn test_empty_source_gives_zero_state() {
        let source = Arc::new(MockSampleSource::new());
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        assert_eq!(monitor.status(), WaterStatus::default());
    }

    #[test]
    fn test_geometry_change_resets_derivation() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        source.publish(&device(), WaterSample::new(44.0, at_minutes(5)));
        assert!(monitor.status().leak_detected);

        monitor.set_geometry(TankGeometry::cylindrical(20.0)).unwrap();

        // Rebound: latest sample re-fetched under the new geometry, but no
        // rate or leak baseline crossed the change.
        let status = monitor.status();
        assert_eq!(status.level_cm, 44.0);
        let expected = std::f64::consts::PI * 100.0 * 44.0;
        assert!((status.volume_l - expected).abs() < 1e-9);
        assert_eq!(status.usage_rate_l_h, 0.0);
        assert!(!status.leak_detected);

        // Old subscription released, new one live.
        assert_eq!(source.subscription_count(), 1);
        assert_eq!(source.unsubscribed_handles().len(), 1);
    }

    #[test]
    fn test_equal_geometry_is_a_no_op() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        source.publish(&device(), WaterSample::new(44.0, at_minutes(5)));
        let before = monitor.status();

        monitor.set_geometry(geometry()).unwrap();

        assert_eq!(monitor.status(), before);
        assert!(source.unsubscribed_handles().is_empty());
    }

    #[test]
    fn test_set_geometry_rejects_invalid_and_keeps_previous() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        let before = monitor.status();

        let err = monitor.set_geometry(TankGeometry::cubical(-1.0, None));
        assert_eq!(
            err,
            Err(MonitorError::Geometry(GeometryError::NonPositiveLength))
        );
        assert_eq!(monitor.status(), before);
        assert!(source.unsubscribed_handles().is_empty());
    }

    #[test]
    fn test_geometry_change_while_stopped_stays_stopped() {
        let source = Arc::new(MockSampleSource::new());
        let monitor = monitor_with(&source);
        monitor.set_geometry(TankGeometry::cylindrical(20.0)).unwrap();
        assert_eq!(source.subscription_count(), 0);
        assert_eq!(monitor.status(), WaterStatus::default());
    }

    #[test]
    fn test_stop_releases_subscription_and_discards_state() {
        let source = Arc::new(MockSampleSource::with_history(
            device(),
            vec![WaterSample::new(50.0, at_minutes(0))],
        ));
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        monitor.stop();

        assert_eq!(source.subscription_count(), 0);
        assert_eq!(source.unsubscribed_handles().len(), 1);
        assert_eq!(monitor.status(), WaterStatus::default());

        // Stop again: no double release.
        monitor.stop();
        assert_eq!(source.unsubscribed_handles().len(), 1);
    }

    #[test]
    fn test_stop_releases_even_without_samples() {
        let source = Arc::new(MockSampleSource::new());
        source.set_fail_fetch(true);
        let monitor = monitor_with(&source);
        monitor.start().unwrap();
        monitor.stop();
        assert_eq!(source.subscription_count(), 0);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let source = Arc::new(MockSampleSource::new());
        {
            let monitor = monitor_with(&source);
            monitor.start().unwrap();
            assert_eq!(source.subscription_count(), 1);
        }
        assert_eq!(source.subscription_count(), 0);
    }

    #[test]
    fn test_independent_monitors_do_not_share_state() {
        let source = Arc::new(MockSampleSource::new());
        let other = DeviceId("tank-2".to_string());
        let monitor_a = monitor_with(&source);
        let monitor_b = TankMonitor::new(
            Arc::clone(&source) as Arc<dyn SampleSource>,
            other.clone(),
            geometry(),
        )
        .unwrap();
        monitor_a.start().unwrap();
        monitor_b.start().unwrap();

        source.publish(&device(), WaterSample::new(30.0, at_minutes(1)));

        assert_eq!(monitor_a.status().level_cm, 30.0);
        assert_eq!(monitor_b.status(), WaterStatus::default());
    }

    #[test]
    fn test_new_refuses_invalid_geometry() {
        let source = Arc::new(MockSampleSource::new()) as Arc<dyn SampleSource>;
        let err = TankMonitor::new(source, device(), TankGeometry::cubical(0.0, None));
        assert_eq!(err.err(), Some(GeometryError::NonPositiveLength));
    }
}
