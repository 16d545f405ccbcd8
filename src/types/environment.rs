//! Environmental conditions — ocean current and surface wave state.

use serde::{Deserialize, Serialize};

/// Horizontal ocean current at the template, as east/north components (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Current {
    /// Eastward component (m/s)
    pub u: f64,
    /// Northward component (m/s)
    pub v: f64,
}

impl Current {
    pub fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    /// Current speed (m/s).
    pub fn magnitude(&self) -> f64 {
        (self.u * self.u + self.v * self.v).sqrt()
    }

    /// Compass angle from north (radians), derived as `atan2(u, v)`.
    pub fn angle_from_north(&self) -> f64 {
        self.u.atan2(self.v)
    }
}

/// Surface wave state aligned per-timestamp with the current series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wave {
    /// Significant wave height (m)
    pub height: f64,
    /// Peak period (s)
    pub period: f64,
    /// Propagation direction from north (radians)
    pub angle_from_north: f64,
}
