//! Mouse-over coordinate readout.
//!
//! A device position in a viewer resolves through the link model into the
//! active layer's pixel frame and, when a celestial frame exists, into sky
//! coordinates. Results carry three independent reliability flags (pixel,
//! sky, value); extrapolated numbers are still shown, never suppressed.

use crate::collection::DataCollection;
use crate::error::FramelinkError;
use crate::frame::SkyCoord;
use crate::link::LinkSet;
use crate::orient::ViewerState;

/// One resolved readout at a device position.
#[derive(Clone, Debug, PartialEq)]
pub struct Readout {
    /// Label of the active (topmost visible) dataset.
    pub data_label: String,
    /// Position in the active dataset's own pixel frame.
    pub pixel: (f64, f64),
    /// Sky position, absent without a valid celestial frame.
    pub world: Option<SkyCoord>,
    /// Data value and unit, absent outside the array.
    pub value: Option<(f64, String)>,
    pub pixel_unreliable: bool,
    pub world_unreliable: bool,
    pub value_unreliable: bool,
}

impl Readout {
    /// Three display lines; world lines are empty without a celestial frame.
    pub fn as_text(&self) -> (String, String, String) {
        let mut line1 = format!(
            "Pixel x={} y={}",
            fmt_pixel(self.pixel.0),
            fmt_pixel(self.pixel.1)
        );
        if let Some((value, unit)) = &self.value {
            line1.push_str(&format!(" Value {}", fmt_sci(*value)));
            if !unit.is_empty() {
                line1.push_str(&format!(" {unit}"));
            }
        }
        match &self.world {
            Some(world) => (
                line1,
                format!(
                    "World {} {} (ICRS)",
                    fmt_ra_hms(world.ra),
                    fmt_dec_dms(world.dec)
                ),
                format!("{:.10} {:.10} (deg)", world.ra, world.dec),
            ),
            None => (line1, String::new(), String::new()),
        }
    }
}

/// Resolve a device position (reference-frame pixels) in a viewer.
///
/// Fails when the viewer has no loaded layer, the active layer has no entry
/// in the link graph, or no reference dataset exists yet.
pub fn compute_readout(
    collection: &DataCollection,
    links: &LinkSet,
    viewer: &ViewerState,
    x: f64,
    y: f64,
) -> Result<Readout, FramelinkError> {
    if links.reference().is_none() {
        return Err(FramelinkError::no_reference());
    }
    let viewer_reference = viewer
        .reference
        .as_deref()
        .ok_or_else(FramelinkError::no_reference)?;
    let label = viewer
        .top_visible_label()
        .ok_or_else(FramelinkError::no_reference)?;
    let dataset = collection
        .get(label)
        .ok_or_else(|| FramelinkError::label_not_linked(label))?;

    // Device positions are expressed in the viewer's reference frame, which
    // need not be the link root.
    let mapped = links.transform(collection, viewer_reference, label, x, y)?;

    let celestial = dataset.adapter.celestial_component();
    let world = celestial.map(|wcs| wcs.pixel_to_world(mapped.x, mapped.y));
    let inside_valid = celestial.map_or(true, |wcs| wcs.contains(mapped.x, mapped.y));

    let value = dataset
        .value_at(mapped.x, mapped.y)
        .map(|v| (v, dataset.unit().to_string()));

    Ok(Readout {
        data_label: label.to_string(),
        pixel: (mapped.x, mapped.y),
        world,
        value,
        pixel_unreliable: mapped.extrapolated,
        world_unreliable: mapped.extrapolated || !inside_valid,
        value_unreliable: mapped.extrapolated || !inside_valid,
    })
}

/// Pixel coordinate with two integer digits and one decimal, zero padded.
fn fmt_pixel(v: f64) -> String {
    format!("{v:04.1}")
}

/// Scientific notation with an explicit sign and two-digit exponent.
fn fmt_sci(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    let abs = value.abs();
    if abs == 0.0 {
        return "+0.00000e+00".to_string();
    }
    let sign = if value < 0.0 { '-' } else { '+' };
    let mut exp = abs.log10().floor() as i32;
    let mut mantissa = abs / 10f64.powi(exp);
    // Rounding can push the mantissa to 10.0.
    if mantissa + 5e-6 >= 10.0 {
        mantissa /= 10.0;
        exp += 1;
    }
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{mantissa:.5}e{exp_sign}{:02}", exp.abs())
}

/// Right ascension in sexagesimal hours, seconds to four decimals.
fn fmt_ra_hms(ra_deg: f64) -> String {
    let hours = ra_deg.rem_euclid(360.0) / 15.0;
    let (h, m, s) = split_sexagesimal(hours);
    let h = h % 24;
    format!("{h:02}h{m:02}m{s:07.4}s")
}

/// Declination in sexagesimal degrees, seconds to four decimals.
fn fmt_dec_dms(dec_deg: f64) -> String {
    let sign = if dec_deg < 0.0 { '-' } else { '+' };
    let (d, m, s) = split_sexagesimal(dec_deg.abs());
    format!("{sign}{d:02}d{m:02}m{s:07.4}s")
}

/// Split a value into whole units, minutes, and seconds rounded to four
/// decimals, carrying overflow from the rounding.
fn split_sexagesimal(value: f64) -> (u32, u32, f64) {
    let mut whole = value.trunc() as u32;
    let rem = (value - value.trunc()) * 60.0;
    let mut minutes = rem.trunc() as u32;
    let mut seconds = (rem - rem.trunc()) * 60.0;
    seconds = (seconds * 1e4).round() / 1e4;
    if seconds >= 60.0 {
        seconds -= 60.0;
        minutes += 1;
    }
    if minutes >= 60 {
        minutes -= 60;
        whole += 1;
    }
    (whole, minutes, seconds)
}
