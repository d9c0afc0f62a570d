//! Tank geometry and level-to-volume conversion.
//!
//! A [`TankGeometry`] describes the tank well enough to turn a level reading
//! (cm) into a held volume. The serde representation matches the JSON the app
//! persists under its `tank_config` key, so saved configurations from
//! existing installs deserialize unchanged.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Supported tank shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankShape {
    Cubical,
    Cylindrical,
}

/// Tank dimensions in centimetres.
///
/// For cylindrical tanks `length_cm` is the diameter and `width_cm` is
/// ignored. Older saved configs omit `width`; it falls back to the length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TankGeometry {
    pub shape: TankShape,
    #[serde(rename = "length")]
    pub length_cm: f64,
    #[serde(rename = "width", default, skip_serializing_if = "Option::is_none")]
    pub width_cm: Option<f64>,
}

impl TankGeometry {
    pub fn cubical(length_cm: f64, width_cm: Option<f64>) -> Self {
        Self {
            shape: TankShape::Cubical,
            length_cm,
            width_cm,
        }
    }

    pub fn cylindrical(diameter_cm: f64) -> Self {
        Self {
            shape: TankShape::Cylindrical,
            length_cm: diameter_cm,
            width_cm: None,
        }
    }

    /// Check the dimensions are finite and positive.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !self.length_cm.is_finite() || self.width_cm.is_some_and(|w| !w.is_finite()) {
            return Err(GeometryError::NotFinite);
        }
        if self.length_cm <= 0.0 {
            return Err(GeometryError::NonPositiveLength);
        }
        if self.width_cm.is_some_and(|w| w <= 0.0) {
            return Err(GeometryError::NonPositiveWidth);
        }
        Ok(())
    }

    pub fn effective_width_cm(&self) -> f64 {
        self.width_cm.unwrap_or(self.length_cm)
    }

    /// Volume held at the given level, clamped to ≥ 0.
    ///
    /// Assumes [`validate`](Self::validate) has passed; callers that accept
    /// geometry from outside the crate go through [`tank_volume`] instead.
    pub fn volume_l(&self, level_cm: f64) -> f64 {
        let volume = match self.shape {
            TankShape::Cubical => self.length_cm * self.effective_width_cm() * level_cm,
            TankShape::Cylindrical => {
                let radius = self.length_cm / 2.0;
                PI * radius * radius * level_cm
            }
        };
        volume.max(0.0)
    }
}

/// Validate the geometry and compute the volume held at `level_cm`.
pub fn tank_volume(geometry: TankGeometry, level_cm: f64) -> Result<f64, GeometryError> {
    geometry.validate()?;
    Ok(geometry.volume_l(level_cm))
}
