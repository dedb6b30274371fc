//! Coordinate frame adapters.
//!
//! Every dataset carries a [`FrameAdapter`] describing how (or whether) its
//! pixel grid maps onto the sky. The adapter is a closed tagged variant:
//!
//! - [`FrameAdapter::PixelOnly`]: no coordinate information.
//! - [`FrameAdapter::Affine`]: a linear FITS-style solution, unbounded.
//! - [`FrameAdapter::General`]: a generalized solution (optionally nonlinear)
//!   with a declared validity region; results computed outside that region
//!   are extrapolations and must be flagged unreliable by callers.

mod affine;
pub mod compass;
mod tan;

pub use affine::{AffineWcs, AxisKind};
pub use tan::{offset_to_world, world_to_offset, SkyCoord, TanProjection};

use serde::{Deserialize, Serialize};

/// Pixel-space validity region of a general solution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.xmin <= x && x <= self.xmax && self.ymin <= y && y <= self.ymax
    }
}

/// Quadratic pixel-plane distortion applied before the linear solution.
///
/// `u' = u + a[0] u^2 + a[1] u v + a[2] v^2` and likewise for `v'` with `b`,
/// where `(u, v)` are offsets from the reference pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub a: [f64; 3],
    pub b: [f64; 3],
}

impl Distortion {
    #[inline]
    fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (
            u + self.a[0] * u * u + self.a[1] * u * v + self.a[2] * v * v,
            v + self.b[0] * u * u + self.b[1] * u * v + self.b[2] * v * v,
        )
    }

    /// Invert by fixed-point iteration. Distortion terms are small
    /// corrections, so a handful of passes reaches float precision.
    fn invert(&self, up: f64, vp: f64) -> (f64, f64) {
        let (mut u, mut v) = (up, vp);
        for _ in 0..12 {
            let (fu, fv) = self.apply(u, v);
            u += up - fu;
            v += vp - fv;
        }
        (u, v)
    }
}

/// A generalized (possibly nonlinear) celestial solution with a declared
/// validity region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneralWcs {
    pub projection: TanProjection,
    #[serde(default)]
    pub distortion: Option<Distortion>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl GeneralWcs {
    pub fn new(projection: TanProjection, bounding_box: Option<BoundingBox>) -> Self {
        Self {
            projection,
            distortion: None,
            bounding_box,
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        let (x, y) = match &self.distortion {
            Some(d) => {
                let u = x - self.projection.crpix[0];
                let v = y - self.projection.crpix[1];
                let (u, v) = d.apply(u, v);
                (u + self.projection.crpix[0], v + self.projection.crpix[1])
            }
            None => (x, y),
        };
        self.projection.pixel_to_world(x, y)
    }

    pub fn world_to_pixel(&self, world: SkyCoord) -> Option<(f64, f64)> {
        let (x, y) = self.projection.world_to_pixel(world)?;
        Some(match &self.distortion {
            Some(d) => {
                let up = x - self.projection.crpix[0];
                let vp = y - self.projection.crpix[1];
                let (u, v) = d.invert(up, vp);
                (u + self.projection.crpix[0], v + self.projection.crpix[1])
            }
            None => (x, y),
        })
    }
}

/// Which family of coordinate solution a dataset carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    None,
    Affine,
    General,
}

/// The coordinate frame attached to a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FrameAdapter {
    /// No coordinate information; the pixel grid is the only frame.
    #[serde(rename = "none")]
    PixelOnly,
    Affine(AffineWcs),
    General(GeneralWcs),
}

impl FrameAdapter {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::PixelOnly => FrameKind::None,
            Self::Affine(_) => FrameKind::Affine,
            Self::General(_) => FrameKind::General,
        }
    }

    /// Whether this frame can express sky coordinates.
    pub fn has_valid_wcs(&self) -> bool {
        self.celestial_component().is_some()
    }

    /// The 2D celestial sub-frame, if present.
    ///
    /// Linear solutions with non-celestial axes have no celestial component
    /// even though their transform is well defined.
    pub fn celestial_component(&self) -> Option<CelestialWcs<'_>> {
        match self {
            Self::PixelOnly => None,
            Self::Affine(wcs) if wcs.is_celestial() => Some(CelestialWcs::Affine(wcs)),
            Self::Affine(_) => None,
            Self::General(wcs) => Some(CelestialWcs::General(wcs)),
        }
    }

    /// Pixel coordinates to sky position, `None` without a celestial frame.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<SkyCoord> {
        Some(self.celestial_component()?.pixel_to_world(x, y))
    }

    /// Sky position to pixel coordinates, `None` without a celestial frame
    /// or behind the tangent plane.
    pub fn world_to_pixel(&self, world: SkyCoord) -> Option<(f64, f64)> {
        self.celestial_component()?.world_to_pixel(world)
    }

    /// Declared validity region; `None` means unbounded.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Self::General(wcs) => wcs.bounding_box,
            _ => None,
        }
    }
}

/// Uniform capability view over the celestial part of an adapter.
#[derive(Clone, Copy, Debug)]
pub enum CelestialWcs<'a> {
    Affine(&'a AffineWcs),
    General(&'a GeneralWcs),
}

impl CelestialWcs<'_> {
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        match self {
            Self::Affine(wcs) => wcs.projection.pixel_to_world(x, y),
            Self::General(wcs) => wcs.pixel_to_world(x, y),
        }
    }

    pub fn world_to_pixel(&self, world: SkyCoord) -> Option<(f64, f64)> {
        match self {
            Self::Affine(wcs) => wcs.projection.world_to_pixel(world),
            Self::General(wcs) => wcs.world_to_pixel(world),
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Self::Affine(_) => None,
            Self::General(wcs) => wcs.bounding_box,
        }
    }

    /// Whether a pixel position lies inside the declared validity region.
    /// Unbounded frames contain every position.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self.bounding_box() {
            Some(bb) => bb.contains(x, y),
            None => true,
        }
    }

    pub fn pixel_scale(&self) -> f64 {
        match self {
            Self::Affine(wcs) => wcs.projection.pixel_scale(),
            Self::General(wcs) => wcs.projection.pixel_scale(),
        }
    }
}
