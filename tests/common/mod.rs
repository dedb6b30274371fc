#![allow(dead_code)]

use framelink::collection::Dataset;
use framelink::frame::{
    AffineWcs, BoundingBox, FrameAdapter, GeneralWcs, SkyCoord, TanProjection,
};
use framelink::session::Session;

/// Shared tangent point for all fixture frames.
pub const RA0: f64 = 337.5202808;
pub const DEC0: f64 = -20.83333306;

/// Plate scale of the fixture frames, degrees per pixel.
pub const SCALE: f64 = 1.0e-4;

pub fn crval() -> SkyCoord {
    SkyCoord::new(RA0, DEC0)
}

/// CD matrix for a frame rotated `rotation_deg` counterclockwise from
/// North-up, East-left by default.
pub fn rotated_cd(rotation_deg: f64, east_left: bool) -> [[f64; 2]; 2] {
    let (sin_r, cos_r) = rotation_deg.to_radians().sin_cos();
    let sx = if east_left { -SCALE } else { SCALE };
    [[cos_r * sx, -sin_r * SCALE], [sin_r * sx, cos_r * SCALE]]
}

pub fn affine_frame(crpix: [f64; 2]) -> FrameAdapter {
    FrameAdapter::Affine(AffineWcs::new(crpix, crval(), rotated_cd(0.0, true)))
}

pub fn general_frame(
    crpix: [f64; 2],
    rotation_deg: f64,
    bbox: Option<(f64, f64, f64, f64)>,
) -> FrameAdapter {
    let projection = TanProjection::new(crpix, crval(), rotated_cd(rotation_deg, true));
    FrameAdapter::General(GeneralWcs::new(
        projection,
        bbox.map(|(xmin, xmax, ymin, ymax)| BoundingBox::new(xmin, xmax, ymin, ymax)),
    ))
}

/// One image with a FITS-style affine WCS and one with no coordinates,
/// loaded in that order.
pub fn session_wcs_nowcs() -> Session {
    let mut session = Session::new();
    session
        .load_dataset(Dataset::filled(
            "has_wcs[SCI,1]",
            (10, 10),
            0.0,
            "",
            affine_frame([0.0, 0.0]),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "no_wcs[SCI,1]",
            (10, 10),
            0.0,
            "",
            FrameAdapter::PixelOnly,
        ))
        .unwrap();
    session
}

/// Two images whose affine frames differ by a one-pixel shift in x:
/// pixel (0, 0) of the first shares sky coordinates with pixel (1, 0) of
/// the second.
pub fn session_wcs_wcs() -> Session {
    let mut session = Session::new();
    session
        .load_dataset(Dataset::filled(
            "has_wcs_1[SCI,1]",
            (10, 10),
            1.0,
            "",
            affine_frame([0.0, 0.0]),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "has_wcs_2[SCI,1]",
            (10, 10),
            1.0,
            "",
            affine_frame([1.0, 0.0]),
        ))
        .unwrap();
    session
}

/// A FITS-WCS image, a rotated bounded general-WCS image, and an image with
/// no coordinates.
pub fn session_wcs_gwcs() -> Session {
    let mut session = Session::new();
    session
        .load_dataset(Dataset::filled(
            "fits_wcs[DATA]",
            (10, 10),
            1.0,
            "",
            affine_frame([5.0, 5.0]),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "gwcs[DATA]",
            (10, 10),
            1.0,
            "",
            general_frame([5.0, 5.0], 45.0, Some((0.0, 9.0, 0.0, 9.0))),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "no_wcs",
            (10, 10),
            1.0,
            "",
            FrameAdapter::PixelOnly,
        ))
        .unwrap();
    session
}

/// Two bounded general-WCS images related by a pure three-pixel translation.
pub fn session_gwcs_gwcs() -> Session {
    let mut session = Session::new();
    session
        .load_dataset(Dataset::filled(
            "gwcs_1[DATA]",
            (3, 10),
            1.0,
            "electron / s",
            general_frame([0.0, 0.0], 0.0, Some((0.0, 9.0, 0.0, 2.0))),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "gwcs_2[DATA]",
            (3, 10),
            0.0,
            "",
            general_frame([-3.0, -3.0], 0.0, Some((0.0, 9.0, 0.0, 2.0))),
        ))
        .unwrap();
    session
}

/// Device position (viewer reference frame) of a pixel in `label`'s frame.
pub fn device_for(session: &Session, viewer: &str, label: &str, x: f64, y: f64) -> (f64, f64) {
    let reference = session
        .viewer(viewer)
        .and_then(|s| s.reference.clone())
        .expect("viewer has a reference");
    let mapped = session
        .links()
        .transform(session.collection(), label, &reference, x, y)
        .expect("transform succeeds");
    (mapped.x, mapped.y)
}
