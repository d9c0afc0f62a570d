//! Sample source seam.
//!
//! The backend layer (the app's realtime database client) implements
//! [`SampleSource`]; the crate consumes it. Delivery is push-based and
//! at-least-once with no ordering guarantee, so downstream code must
//! tolerate duplicates and out-of-order arrivals.

use std::time::SystemTime;

use thiserror::Error;

use crate::models::{DeviceId, WaterSample};

/// Callback invoked for each newly inserted sample on a subscription.
pub type SampleSink = Box<dyn Fn(WaterSample) + Send + Sync>;

/// Opaque token identifying one live subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

pub trait SampleSource: Send + Sync {
    /// Most recent sample for the device, if any exist.
    fn fetch_latest(&self, device_id: &DeviceId) -> Result<Option<WaterSample>, SourceError>;

    /// Samples strictly after `since`, ascending by timestamp. Feeds the
    /// history view's 24-hour window.
    fn fetch_since(
        &self,
        device_id: &DeviceId,
        since: SystemTime,
    ) -> Result<Vec<WaterSample>, SourceError>;

    /// Register for newly inserted samples for the device.
    fn subscribe(
        &self,
        device_id: &DeviceId,
        sink: SampleSink,
    ) -> Result<SubscriptionHandle, SourceError>;

    /// Release a subscription. Infallible; releasing an already-released
    /// handle is a no-op.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
