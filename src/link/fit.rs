//! Affine approximation of the relation between two celestial frames.
//!
//! WCS-derived links are exact compositions of two projections. When both
//! frames are (close to) linearly related, a fitted affine map is preferred:
//! it is cheaper per point and numerically simpler. The fit solves the map
//! exactly on three sample points and validates on a fourth; a residual
//! above tolerance rejects the approximation and the caller keeps the full
//! coordinate link.

use nalgebra::{Matrix3, Vector3};

use crate::frame::CelestialWcs;

/// Residual (pixels) above which an affine approximation is rejected.
const FIT_TOLERANCE_PX: f64 = 1e-3;

/// Linear-part deviation from identity below which a fit is a pure offset.
const OFFSET_TOLERANCE: f64 = 1e-9;

/// A 2D affine map between pixel grids: `q = m * p + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineMap {
    pub m: [[f64; 2]; 2],
    pub t: [f64; 2],
}

impl AffineMap {
    /// The identity map shifted by `(tx, ty)`.
    pub fn offset(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0], [0.0, 1.0]],
            t: [tx, ty],
        }
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.t[0],
            self.m[1][0] * x + self.m[1][1] * y + self.t[1],
        )
    }

    /// Inverse map; `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0];
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv = [
            [self.m[1][1] / det, -self.m[0][1] / det],
            [-self.m[1][0] / det, self.m[0][0] / det],
        ];
        let tx = -(inv[0][0] * self.t[0] + inv[0][1] * self.t[1]);
        let ty = -(inv[1][0] * self.t[0] + inv[1][1] * self.t[1]);
        Some(Self {
            m: inv,
            t: [tx, ty],
        })
    }

    /// Whether the linear part is the identity within tolerance.
    pub fn is_offset(&self) -> bool {
        (self.m[0][0] - 1.0).abs() < OFFSET_TOLERANCE
            && (self.m[1][1] - 1.0).abs() < OFFSET_TOLERANCE
            && self.m[0][1].abs() < OFFSET_TOLERANCE
            && self.m[1][0].abs() < OFFSET_TOLERANCE
    }

    /// Rotation component of the linear part, radians counterclockwise.
    pub fn rotation(&self) -> f64 {
        self.m[1][0].atan2(self.m[0][0])
    }

    /// Angle of the image of a direction at angle `theta` under the linear
    /// part. Unlike [`rotation`](Self::rotation) this is exact for
    /// reflections and shears as well.
    pub fn transform_angle(&self, theta: f64) -> f64 {
        let (s, c) = theta.sin_cos();
        let vx = self.m[0][0] * c + self.m[0][1] * s;
        let vy = self.m[1][0] * c + self.m[1][1] * s;
        vy.atan2(vx)
    }
}

/// Result of attempting an affine approximation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FitKind {
    Offset,
    Affine,
}

/// Fit an affine map carrying `from`-frame pixels onto `to`-frame pixels.
///
/// Sample points are taken from `from`'s declared bounding box when present,
/// else from its array shape. Returns `None` when any sample fails to
/// project or the validation residual exceeds tolerance.
pub fn fit_affine(
    from: CelestialWcs<'_>,
    from_shape: (usize, usize),
    to: CelestialWcs<'_>,
) -> Option<(AffineMap, FitKind)> {
    let (x0, x1, y0, y1) = match from.bounding_box() {
        Some(bb) => (bb.xmin, bb.xmax, bb.ymin, bb.ymax),
        None => {
            let (ny, nx) = from_shape;
            (0.0, (nx.max(2) - 1) as f64, 0.0, (ny.max(2) - 1) as f64)
        }
    };

    let samples = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];
    let mut mapped = [(0.0, 0.0); 4];
    for (i, &(x, y)) in samples.iter().enumerate() {
        mapped[i] = to.world_to_pixel(from.pixel_to_world(x, y))?;
    }

    let design = Matrix3::new(
        samples[0].0,
        samples[0].1,
        1.0,
        samples[1].0,
        samples[1].1,
        1.0,
        samples[2].0,
        samples[2].1,
        1.0,
    );
    let lu = design.lu();
    let row_x = lu.solve(&Vector3::new(mapped[0].0, mapped[1].0, mapped[2].0))?;
    let row_y = lu.solve(&Vector3::new(mapped[0].1, mapped[1].1, mapped[2].1))?;

    let map = AffineMap {
        m: [[row_x[0], row_x[1]], [row_y[0], row_y[1]]],
        t: [row_x[2], row_y[2]],
    };

    // Validate on the fourth corner.
    let (px, py) = map.apply(samples[3].0, samples[3].1);
    let residual = ((px - mapped[3].0).powi(2) + (py - mapped[3].1).powi(2)).sqrt();
    if residual > FIT_TOLERANCE_PX {
        log::debug!("affine fit rejected, residual {residual:.3e} px");
        return None;
    }

    let kind = if map.is_offset() {
        FitKind::Offset
    } else {
        FitKind::Affine
    };
    Some((map, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AffineWcs, FrameAdapter, SkyCoord};
    use approx::assert_relative_eq;

    fn frame(crpix: [f64; 2], cd: [[f64; 2]; 2]) -> FrameAdapter {
        FrameAdapter::Affine(AffineWcs::new(crpix, SkyCoord::new(337.5, -20.8), cd))
    }

    #[test]
    fn test_translated_pair_fits_as_offset() {
        let cd = [[-1e-4, 0.0], [0.0, 1e-4]];
        let a = frame([0.0, 0.0], cd);
        let b = frame([1.0, 0.0], cd);
        let (map, kind) = fit_affine(
            a.celestial_component().unwrap(),
            (10, 10),
            b.celestial_component().unwrap(),
        )
        .unwrap();
        assert_eq!(kind, FitKind::Offset);
        let (x, y) = map.apply(0.0, 0.0);
        assert_relative_eq!(x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rotated_pair_fits_as_affine() {
        let s = 1e-4;
        let a = frame([5.0, 5.0], [[-s, 0.0], [0.0, s]]);
        // Same tangent point, grid rotated 90 degrees.
        let b = frame([5.0, 5.0], [[0.0, -s], [-s, 0.0]]);
        let (map, kind) = fit_affine(
            a.celestial_component().unwrap(),
            (10, 10),
            b.celestial_component().unwrap(),
        )
        .unwrap();
        assert_eq!(kind, FitKind::Affine);
        assert!(!map.is_offset());

        // The fitted map agrees with the exact composition.
        let wa = a.celestial_component().unwrap();
        let wb = b.celestial_component().unwrap();
        let exact = wb.world_to_pixel(wa.pixel_to_world(2.0, 7.0)).unwrap();
        let approx = map.apply(2.0, 7.0);
        assert_relative_eq!(approx.0, exact.0, epsilon = 1e-5);
        assert_relative_eq!(approx.1, exact.1, epsilon = 1e-5);
    }

    #[test]
    fn test_inverse_round_trips() {
        let map = AffineMap {
            m: [[0.0, -1.0], [1.0, 0.0]],
            t: [3.0, -2.0],
        };
        let inv = map.inverse().unwrap();
        let (x, y) = inv.apply(map.apply(4.0, 5.0).0, map.apply(4.0, 5.0).1);
        assert_relative_eq!(x, 4.0, epsilon = 1e-12);
        assert_relative_eq!(y, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_extraction() {
        let map = AffineMap {
            m: [[0.0, -1.0], [1.0, 0.0]],
            t: [0.0, 0.0],
        };
        assert_relative_eq!(map.rotation(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_transform_handles_flips() {
        // Mirror across the y axis: theta maps to pi - theta.
        let flip = AffineMap {
            m: [[-1.0, 0.0], [0.0, 1.0]],
            t: [0.0, 0.0],
        };
        assert_relative_eq!(
            flip.transform_angle(0.5),
            std::f64::consts::PI - 0.5,
            epsilon = 1e-12
        );
    }
}
