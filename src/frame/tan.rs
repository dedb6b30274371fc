//! Gnomonic (tangent plane) projection core shared by the affine and general
//! frame adapters.
//!
//! Pixel offsets from the reference pixel are mapped through the CD matrix to
//! intermediate tangent-plane coordinates, then deprojected onto the sphere
//! about the reference world position. The same machinery runs in both
//! directions, so `world_to_pixel(pixel_to_world(p)) == p` exactly (up to
//! floating point) for any point in front of the tangent plane.

use serde::{Deserialize, Serialize};

/// A position on the sky, ICRS, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    #[inline]
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Returns true if both components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.ra.is_finite() && self.dec.is_finite()
    }
}

/// Compute the sky position at tangent-plane offsets `(dx, dy)` (degrees)
/// from a base position.
///
/// `dx` grows toward increasing RA, `dy` toward increasing Dec. RA is
/// normalized into `[0, 360)`.
pub fn offset_to_world(base: SkyCoord, dx_deg: f64, dy_deg: f64) -> SkyCoord {
    let x = dx_deg.to_radians();
    let y = dy_deg.to_radians();
    let ra0 = base.ra.to_radians();
    let dec0 = base.dec.to_radians();

    let sdec0 = dec0.sin();
    let cdec0 = dec0.cos();
    let d = cdec0 - y * sdec0;

    let mut ra = x.atan2(d) + ra0;
    let twopi = std::f64::consts::TAU;
    ra = ra.rem_euclid(twopi);
    let dec = (sdec0 + y * cdec0).atan2((x * x + d * d).sqrt());

    SkyCoord::new(ra.to_degrees(), dec.to_degrees())
}

/// Project a sky position onto the tangent plane at `base`, returning
/// offsets in degrees.
///
/// Returns `None` when the position is on or behind the tangent plane
/// (angular distance >= 90 degrees from `base`).
pub fn world_to_offset(base: SkyCoord, world: SkyCoord) -> Option<(f64, f64)> {
    let ra0 = base.ra.to_radians();
    let dec0 = base.dec.to_radians();
    let ra = world.ra.to_radians();
    let dec = world.dec.to_radians();

    let sdec0 = dec0.sin();
    let cdec0 = dec0.cos();
    let sdec = dec.sin();
    let cdec = dec.cos();
    let dra = ra - ra0;

    let denom = sdec * sdec0 + cdec * cdec0 * dra.cos();
    if denom <= 0.0 {
        return None;
    }

    let x = cdec * dra.sin() / denom;
    let y = (sdec * cdec0 - cdec * sdec0 * dra.cos()) / denom;
    Some((x.to_degrees(), y.to_degrees()))
}

/// The linear + gnomonic part of a FITS-style celestial solution.
///
/// `cd` maps pixel offsets from `crpix` to tangent-plane offsets in degrees:
/// `cd[0] = [cd1_1, cd1_2]`, `cd[1] = [cd2_1, cd2_2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TanProjection {
    /// Reference pixel.
    pub crpix: [f64; 2],
    /// Sky position of the reference pixel.
    pub crval: SkyCoord,
    /// CD matrix, degrees per pixel.
    pub cd: [[f64; 2]; 2],
}

impl TanProjection {
    pub fn new(crpix: [f64; 2], crval: SkyCoord, cd: [[f64; 2]; 2]) -> Self {
        Self { crpix, crval, cd }
    }

    /// Pixel coordinates to sky position.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        let (dx, dy) = self.pixel_to_offset(x, y);
        offset_to_world(self.crval, dx, dy)
    }

    /// Sky position to pixel coordinates.
    ///
    /// Returns `None` when the position is behind the tangent plane.
    pub fn world_to_pixel(&self, world: SkyCoord) -> Option<(f64, f64)> {
        let (dx, dy) = world_to_offset(self.crval, world)?;
        Some(self.offset_to_pixel(dx, dy))
    }

    /// Pixel coordinates to tangent-plane offsets in degrees.
    #[inline]
    pub fn pixel_to_offset(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x - self.crpix[0];
        let v = y - self.crpix[1];
        (
            self.cd[0][0] * u + self.cd[0][1] * v,
            self.cd[1][0] * u + self.cd[1][1] * v,
        )
    }

    /// Tangent-plane offsets in degrees to pixel coordinates.
    #[inline]
    pub fn offset_to_pixel(&self, dx: f64, dy: f64) -> (f64, f64) {
        let inv_det = 1.0 / self.det();
        let u = inv_det * (self.cd[1][1] * dx - self.cd[0][1] * dy);
        let v = inv_det * (-self.cd[1][0] * dx + self.cd[0][0] * dy);
        (u + self.crpix[0], v + self.crpix[1])
    }

    #[inline]
    pub fn det(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// Approximate pixel scale in degrees per pixel.
    pub fn pixel_scale(&self) -> f64 {
        self.det().abs().sqrt()
    }
}
