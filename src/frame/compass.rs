//! Compass angles of a celestial frame.
//!
//! Computes the position angles of North and East on a dataset's pixel grid
//! by walking short arcs from the field center along the +Dec and +RA
//! directions. The orientation manager uses these angles to build synthetic
//! "North-up" frames and to auto-rotate new orientations.

use super::{offset_to_world, CelestialWcs};

/// Orientation of a frame's pixel grid on the sky.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompassInfo {
    /// Position angle of North, degrees, measured from the +y pixel axis.
    pub degn: f64,
    /// Position angle of East after removing the North rotation.
    pub dege: f64,
    /// True when the frame is right-handed on the sky (East right).
    pub flip: bool,
}

/// Pixel position reached by walking `(dx, dy)` degrees on the tangent plane
/// from the world position of pixel `(x, y)`.
fn add_offset_xy(wcs: CelestialWcs<'_>, x: f64, y: f64, dx: f64, dy: f64) -> Option<(f64, f64)> {
    let base = wcs.pixel_to_world(x, y);
    wcs.world_to_pixel(offset_to_world(base, dx, dy))
}

/// Rotate a point by `theta_deg` counterclockwise about `(xoff, yoff)`.
fn rotate_pt(x: f64, y: f64, theta_deg: f64, xoff: f64, yoff: f64) -> (f64, f64) {
    let a = x - xoff;
    let b = y - yoff;
    let (sin_t, cos_t) = theta_deg.to_radians().sin_cos();
    (
        a * cos_t - b * sin_t + xoff,
        a * sin_t + b * cos_t + yoff,
    )
}

/// Compute the compass angles of a frame, evaluated at the center of a grid
/// with shape `(ny, nx)`.
///
/// Returns `None` when the arcs leave the projectable hemisphere.
pub fn compass_info(wcs: CelestialWcs<'_>, shape: (usize, usize)) -> Option<CompassInfo> {
    let (ny, nx) = shape;
    let x = nx as f64 * 0.5;
    let y = ny as f64 * 0.5;
    let radius_px = (nx.min(ny) as f64) * 0.4;

    // Arm length in degrees that corresponds to radius_px on each axis.
    let (xe1, ye1) = add_offset_xy(wcs, x, y, 1.0, 0.0)?;
    let (xn1, yn1) = add_offset_xy(wcs, x, y, 0.0, 1.0)?;
    let px_per_deg_e = ((ye1 - y).powi(2) + (xe1 - x).powi(2)).sqrt();
    let px_per_deg_n = ((yn1 - y).powi(2) + (xn1 - x).powi(2)).sqrt();
    let len_deg_e = radius_px / px_per_deg_e;
    let len_deg_n = radius_px / px_per_deg_n;

    let (xe, ye) = add_offset_xy(wcs, x, y, len_deg_e, 0.0)?;
    let (xn, yn) = add_offset_xy(wcs, x, y, 0.0, len_deg_n)?;

    let degn = (xn - x).atan2(yn - y).to_degrees();

    // Remove the North rotation before measuring East.
    let (xe2, ye2) = rotate_pt(xe, ye, degn, x, y);
    let dege = (xe2 - x).atan2(ye2 - y).to_degrees();

    // Right-handed frames display East to the right.
    let flip = dege > 0.0;
    let degn = if flip && degn.abs() > 1e-9 { -degn } else { degn };

    Some(CompassInfo { degn, dege, flip })
}
