use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::models::{DeviceId, WaterSample};
use crate::source::{SampleSink, SampleSource, SourceError, SubscriptionHandle};

#[derive(Default)]
struct MockState {
    samples: HashMap<DeviceId, Vec<WaterSample>>,
    sinks: HashMap<u64, (DeviceId, Arc<SampleSink>)>,
    unsubscribed: Vec<SubscriptionHandle>,
    next_handle: u64,
    fail_fetch: bool,
    fail_subscribe: bool,
}

/// In-memory [`SampleSource`] for tests and previews.
///
/// Holds canned per-device history, fans published samples out to live
/// subscriptions, and can be toggled to fail fetches or subscribes to
/// exercise the source-unavailable paths.
#[derive(Default)]
pub struct MockSampleSource {
    state: Mutex<MockState>,
}

impl MockSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(device_id: DeviceId, samples: Vec<WaterSample>) -> Self {
        let source = Self::new();
        source.state.lock().samples.insert(device_id, samples);
        source
    }

    /// Simulate a backend insert: record the sample and deliver it to every
    /// live subscription for the device.
    pub fn publish(&self, device_id: &DeviceId, sample: WaterSample) {
        let sinks: Vec<Arc<SampleSink>> = {
            let mut state = self.state.lock();
            state
                .samples
                .entry(device_id.clone())
                .or_default()
                .push(sample.clone());
            state
                .sinks
                .values()
                .filter(|(id, _)| id == device_id)
                .map(|(_, sink)| Arc::clone(sink))
                .collect()
        };
        // Sinks run outside the lock, like a real delivery thread would.
        for sink in sinks {
            sink(sample.clone());
        }
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().sinks.len()
    }

    pub fn unsubscribed_handles(&self) -> Vec<SubscriptionHandle> {
        self.state.lock().unsubscribed.clone()
    }
}

impl SampleSource for MockSampleSource {
    fn fetch_latest(&self, device_id: &DeviceId) -> Result<Option<WaterSample>, SourceError> {
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(SourceError::Unavailable("mock fetch failure".to_string()));
        }
        Ok(state
            .samples
            .get(device_id)
            .and_then(|samples| samples.iter().max_by_key(|s| s.taken_at).cloned()))
    }

    fn fetch_since(
        &self,
        device_id: &DeviceId,
        since: SystemTime,
    ) -> Result<Vec<WaterSample>, SourceError> {
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(SourceError::Unavailable("mock fetch failure".to_string()));
        }
        let mut rows: Vec<WaterSample> = state
            .samples
            .get(device_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.taken_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|s| s.taken_at);
        Ok(rows)
    }

    fn subscribe(
        &self,
        device_id: &DeviceId,
        sink: SampleSink,
    ) -> Result<SubscriptionHandle, SourceError> {
        let mut state = self.state.lock();
        if state.fail_subscribe {
            return Err(SourceError::Unavailable(
                "mock subscribe failure".to_string(),
            ));
        }
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        state
            .sinks
            .insert(handle.0, (device_id.clone(), Arc::new(sink)));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state.lock();
        state.sinks.remove(&handle.0);
        state.unsubscribed.push(handle);
    }
}
