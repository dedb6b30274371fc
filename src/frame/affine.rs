//! Affine (linear) celestial solutions.

use serde::{Deserialize, Serialize};

use super::tan::{SkyCoord, TanProjection};

/// What the two world axes of a linear solution represent.
///
/// Headers without celestial axis types still parse into a usable linear
/// transform, but such a frame cannot participate in WCS linking and
/// produces no sky readout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// ICRS right ascension / declination.
    #[default]
    Celestial,
    /// Unspecified linear world axes.
    Linear,
}

/// An affine/linear astrometric solution.
///
/// Unbounded: there is no declared validity region, and transforms are
/// trusted everywhere the projection is defined.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineWcs {
    pub projection: TanProjection,
    #[serde(default)]
    pub axes: AxisKind,
}

impl AffineWcs {
    pub fn new(crpix: [f64; 2], crval: SkyCoord, cd: [[f64; 2]; 2]) -> Self {
        Self {
            projection: TanProjection::new(crpix, crval, cd),
            axes: AxisKind::Celestial,
        }
    }

    /// A linear solution whose world axes are not celestial.
    pub fn non_celestial(crpix: [f64; 2], cd: [[f64; 2]; 2]) -> Self {
        Self {
            projection: TanProjection::new(crpix, SkyCoord::new(0.0, 0.0), cd),
            axes: AxisKind::Linear,
        }
    }

    #[inline]
    pub fn is_celestial(&self) -> bool {
        self.axes == AxisKind::Celestial
    }
}
