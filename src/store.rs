//! Configuration persistence seam.
//!
//! The app's key/value layer implements [`ConfigStore`]; the mechanics of
//! that layer stay outside the crate. The persisted shape is the serde
//! representation of [`TankGeometry`](crate::geometry::TankGeometry) —
//! the JSON already stored under the app's `tank_config` key.

use parking_lot::Mutex;
use thiserror::Error;

use crate::geometry::TankGeometry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt config: {0}")]
    Corrupt(String),
}

pub trait ConfigStore: Send + Sync {
    /// Saved tank configuration, if one exists.
    fn load_geometry(&self) -> Result<Option<TankGeometry>, StoreError>;

    fn save_geometry(&self, geometry: &TankGeometry) -> Result<(), StoreError>;
}

/// In-memory [`ConfigStore`] for tests and previews.
#[derive(Default)]
pub struct MemoryConfigStore {
    geometry: Mutex<Option<TankGeometry>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_geometry(&self) -> Result<Option<TankGeometry>, StoreError> {
        Ok(self.geometry.lock().clone())
    }

    fn save_geometry(&self, geometry: &TankGeometry) -> Result<(), StoreError> {
        *self.geometry.lock() = Some(geometry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_loads_none() {
        let store = MemoryConfigStore::new();
        assert_eq!(store.load_geometry().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryConfigStore::new();
        let geometry = TankGeometry::cylindrical(20.0);
        store.save_geometry(&geometry).unwrap();
        assert_eq!(store.load_geometry().unwrap(), Some(geometry));
    }

    #[test]
    fn test_save_overwrites() {
        let store = MemoryConfigStore::new();
        store
            .save_geometry(&TankGeometry::cubical(100.0, Some(100.0)))
            .unwrap();
        let updated = TankGeometry::cubical(120.0, Some(80.0));
        store.save_geometry(&updated).unwrap();
        assert_eq!(store.load_geometry().unwrap(), Some(updated));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Unavailable("disk full".to_string()).to_string(),
            "store unavailable: disk full"
        );
        assert_eq!(
            StoreError::Corrupt("not json".to_string()).to_string(),
            "corrupt config: not json"
        );
    }
}
