//! Interactive markers and their reprojection across frame changes.
//!
//! A marker's position is captured in the frame of the dataset that was
//! active when it was placed, together with its sky position when one
//! existed. When the link type or a viewer's reference changes, display
//! positions are recomputed from the stored sky position; pixel-only markers
//! cannot survive a transition into WCS linking and are dropped with a
//! warning rather than silently mis-positioned.

use std::io::Write;

use serde::Serialize;

use crate::collection::DataCollection;
use crate::error::FramelinkError;
use crate::frame::SkyCoord;
use crate::link::{LinkSet, LinkType};
use crate::readout::Readout;

/// One marker table entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkerRow {
    pub viewer: String,
    /// Dataset the marker was placed on; its frame anchors the pixel
    /// position.
    pub data_label: String,
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub pixel_unreliable: bool,
    pub world_ra: Option<f64>,
    pub world_dec: Option<f64>,
    pub world_unreliable: bool,
    pub value: Option<f64>,
    pub value_unit: String,
    pub value_unreliable: bool,
    /// Display position in the viewer's reference frame.
    #[serde(skip)]
    pub mark_x: f64,
    #[serde(skip)]
    pub mark_y: f64,
}

impl MarkerRow {
    pub fn world(&self) -> Option<SkyCoord> {
        Some(SkyCoord::new(self.world_ra?, self.world_dec?))
    }
}

/// The marker table shared by all viewers.
#[derive(Clone, Debug, Default)]
pub struct MarkerTable {
    rows: Vec<MarkerRow>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a marker from a resolved readout at a device position.
    pub fn add_from_readout(&mut self, viewer: &str, readout: &Readout, device: (f64, f64)) {
        self.rows.push(MarkerRow {
            viewer: viewer.to_string(),
            data_label: readout.data_label.clone(),
            pixel_x: readout.pixel.0,
            pixel_y: readout.pixel.1,
            pixel_unreliable: readout.pixel_unreliable,
            world_ra: readout.world.map(|w| w.ra),
            world_dec: readout.world.map(|w| w.dec),
            world_unreliable: readout.world_unreliable,
            value: readout.value.as_ref().map(|(v, _)| *v),
            value_unit: readout
                .value
                .as_ref()
                .map(|(_, u)| u.clone())
                .unwrap_or_default(),
            value_unreliable: readout.value_unreliable,
            mark_x: device.0,
            mark_y: device.1,
        });
    }

    pub fn rows(&self) -> &[MarkerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Remove the marker closest to a device position in the given viewer,
    /// comparing sky separations when WCS-linked and pixel distances
    /// otherwise. Returns the removed row.
    pub fn remove_nearest(
        &mut self,
        viewer: &str,
        x: f64,
        y: f64,
        link_type: LinkType,
        cursor_world: Option<SkyCoord>,
    ) -> Option<MarkerRow> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, row) in self.rows.iter().enumerate() {
            if row.viewer != viewer {
                continue;
            }
            let dist = match (link_type, cursor_world, row.world()) {
                (LinkType::Wcs, Some(cursor), Some(world)) => {
                    let dra = (world.ra - cursor.ra) * cursor.dec.to_radians().cos();
                    let ddec = world.dec - cursor.dec;
                    (dra * dra + ddec * ddec).sqrt()
                }
                _ => {
                    let dx = row.mark_x - x;
                    let dy = row.mark_y - y;
                    (dx * dx + dy * dy).sqrt()
                }
            };
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| self.rows.remove(idx))
    }

    /// Recompute display positions for a viewer after a link or reference
    /// change. `viewer_reference` is the frame the viewer displays in.
    /// Returns the number of rows dropped because their origin frame had no
    /// sky coordinates to carry over.
    pub fn reproject(
        &mut self,
        collection: &DataCollection,
        links: &LinkSet,
        viewer: &str,
        viewer_reference: Option<&str>,
    ) -> usize {
        let mut dropped = 0;
        self.rows.retain_mut(|row| {
            if row.viewer != viewer {
                return true;
            }
            match links.link_type() {
                LinkType::Wcs => {
                    // Positions are pinned on the sky; express them in the
                    // new reference frame.
                    let new_pos = row.world().and_then(|world| {
                        viewer_reference
                            .and_then(|r| collection.get(r))
                            .and_then(|d| d.adapter.world_to_pixel(world))
                    });
                    match new_pos {
                        Some((x, y)) => {
                            row.mark_x = x;
                            row.mark_y = y;
                            true
                        }
                        None => {
                            log::warn!(
                                "dropping marker on '{}': no sky position to reproject",
                                row.data_label
                            );
                            dropped += 1;
                            false
                        }
                    }
                }
                LinkType::Pixels => {
                    // Convert through the frame of the dataset the marker
                    // was created on; its pixels coincide with the
                    // reference grid under pixel identity.
                    if let Some(world) = row.world() {
                        if let Some((x, y)) = collection
                            .get(&row.data_label)
                            .and_then(|d| d.adapter.world_to_pixel(world))
                        {
                            row.mark_x = x;
                            row.mark_y = y;
                        }
                    }
                    // Pixel-only markers keep their stored position.
                    true
                }
            }
        });
        dropped
    }

    /// Write the table as CSV, one row per marker.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), FramelinkError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record([
            "pixel_x",
            "pixel_y",
            "pixel:unreliable",
            "world_ra",
            "world_dec",
            "world:unreliable",
            "value",
            "value:unit",
            "value:unreliable",
            "viewer",
            "data_label",
        ])
        .map_err(csv_io)?;
        for row in &self.rows {
            out.write_record([
                row.pixel_x.to_string(),
                row.pixel_y.to_string(),
                row.pixel_unreliable.to_string(),
                row.world_ra.map(|v| v.to_string()).unwrap_or_default(),
                row.world_dec.map(|v| v.to_string()).unwrap_or_default(),
                row.world_unreliable.to_string(),
                row.value.map(|v| v.to_string()).unwrap_or_default(),
                row.value_unit.clone(),
                row.value_unreliable.to_string(),
                row.viewer.clone(),
                row.data_label.clone(),
            ])
            .map_err(csv_io)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn csv_io(err: csv::Error) -> FramelinkError {
    FramelinkError::Io(std::io::Error::other(err))
}
