pub mod derivation;
pub mod error;
pub mod geometry;
pub mod history;
pub mod models;
pub mod monitor;
pub mod source;
pub mod source_mock;
pub mod store;

uniffi::include_scaffolding!("hydrosense");

pub use derivation::{
    DerivationState, WaterStatus, LEAK_DROP_THRESHOLD_CM, LEAK_WINDOW_HOURS,
};
pub use error::GeometryError;
pub use geometry::{tank_volume, TankGeometry, TankShape};
pub use history::{history_stats, HistoryStats};
pub use models::{DeviceId, WaterSample};
pub use monitor::{MonitorError, StatusObserver, TankMonitor};
pub use source::{SampleSink, SampleSource, SourceError, SubscriptionHandle};
pub use source_mock::MockSampleSource;
pub use store::{ConfigStore, MemoryConfigStore, StoreError};
