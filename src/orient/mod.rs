//! Reference resolution and orientation management.
//!
//! Each viewer designates one dataset in the collection as its reference:
//! the frame all pixel and world queries for that viewer are expressed
//! against. In pixel mode there is exactly one global reference (the first
//! loaded dataset); in WCS mode each viewer may point at a synthetic
//! orientation layer and remembers its last explicit choice across link-type
//! round trips.

use std::collections::BTreeMap;

use crate::collection::{Component, Dataset, DatasetOrigin};
use crate::frame::compass::CompassInfo;
use crate::frame::{FrameAdapter, GeneralWcs, SkyCoord, TanProjection};
use crate::link::LinkType;

/// Label of the orientation layer created at the first WCS link.
pub const DEFAULT_ORIENTATION_LABEL: &str = "Default orientation";

/// Zoom/pan limits of a viewer, in reference-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Limits {
    /// Full-array limits for a grid with shape `(ny, nx)`.
    pub fn for_shape(shape: (usize, usize)) -> Self {
        Self {
            x_min: -0.5,
            x_max: shape.1 as f64 - 0.5,
            y_min: -0.5,
            y_max: shape.0 as f64 - 0.5,
        }
    }

    /// The four corners, counterclockwise from the lower-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x_min, self.y_min),
            (self.x_min, self.y_max),
            (self.x_max, self.y_max),
            (self.x_max, self.y_min),
        ]
    }

    /// Axis-aligned hull of a set of points.
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut limits = Self {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        for &(x, y) in points {
            limits.x_min = limits.x_min.min(x);
            limits.x_max = limits.x_max.max(x);
            limits.y_min = limits.y_min.min(y);
            limits.y_max = limits.y_max.max(y);
        }
        limits
    }
}

/// Per-viewer reference and display state.
#[derive(Clone, Debug)]
pub struct ViewerState {
    /// Label of the current reference dataset.
    pub reference: Option<String>,
    /// Last orientation explicitly chosen while WCS-linked; restored when
    /// switching back to WCS mode.
    pub last_wcs_reference: Option<String>,
    pub limits: Option<Limits>,
    /// Loaded layer labels in load order.
    pub layers: Vec<String>,
    /// Index of the topmost visible layer; blinking rotates this.
    top: usize,
}

impl ViewerState {
    fn new() -> Self {
        Self {
            reference: None,
            last_wcs_reference: None,
            limits: None,
            layers: Vec::new(),
            top: 0,
        }
    }

    /// The active layer: the most recently shown dataset is on top.
    pub fn top_visible_label(&self) -> Option<&str> {
        self.layers.get(self.top).map(String::as_str)
    }

    /// Toggle which loaded dataset is topmost, without changing the link
    /// graph.
    pub fn blink_once(&mut self) {
        if !self.layers.is_empty() {
            self.top = (self.top + 1) % self.layers.len();
        }
    }

    pub fn add_layer(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.layers.contains(&label) {
            self.layers.push(label);
            // Last loaded goes on top.
            self.top = self.layers.len() - 1;
        }
    }

    pub fn remove_layer(&mut self, label: &str) {
        if let Some(idx) = self.layers.iter().position(|l| l == label) {
            self.layers.remove(idx);
            if self.top >= self.layers.len() {
                self.top = 0;
            }
        }
    }
}

/// Owns the viewer states and applies the reference transition rules.
#[derive(Debug, Default)]
pub struct OrientationManager {
    viewers: BTreeMap<String, ViewerState>,
}

impl OrientationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_viewer(&mut self, id: impl Into<String>) -> &mut ViewerState {
        self.viewers.entry(id.into()).or_insert_with(ViewerState::new)
    }

    pub fn viewer(&self, id: &str) -> Option<&ViewerState> {
        self.viewers.get(id)
    }

    pub fn viewer_mut(&mut self, id: &str) -> Option<&mut ViewerState> {
        self.viewers.get_mut(id)
    }

    pub fn viewer_ids(&self) -> Vec<&str> {
        self.viewers.keys().map(String::as_str).collect()
    }

    /// Set a viewer's reference explicitly, remembering it as the last WCS
    /// choice when WCS-linked. The outer `None` means the viewer does not
    /// exist; the inner value is the previous reference.
    pub fn set_reference(
        &mut self,
        viewer: &str,
        label: &str,
        link_type: LinkType,
    ) -> Option<Option<String>> {
        let state = self.viewers.get_mut(viewer)?;
        let previous = state.reference.replace(label.to_string());
        if link_type == LinkType::Wcs {
            state.last_wcs_reference = Some(label.to_string());
        }
        Some(previous)
    }

    /// Apply the reference transition rules for a link-type change.
    ///
    /// Pixel mode has a single global reference shared by all viewers; WCS
    /// mode restores each viewer's last explicit orientation choice,
    /// defaulting to the default orientation layer.
    ///
    /// Returns `(viewer, new_reference)` for every viewer whose reference
    /// actually changed.
    pub fn apply_link_type(
        &mut self,
        link_type: LinkType,
        pixel_reference: &str,
        default_orientation: &str,
    ) -> Vec<(String, String)> {
        let mut changed = Vec::new();
        for (id, state) in &mut self.viewers {
            let target = match link_type {
                LinkType::Pixels => pixel_reference.to_string(),
                LinkType::Wcs => state
                    .last_wcs_reference
                    .clone()
                    .unwrap_or_else(|| default_orientation.to_string()),
            };
            if state.reference.as_deref() != Some(target.as_str()) {
                state.reference = Some(target.clone());
                changed.push((id.clone(), target));
            }
        }
        changed
    }

    /// Viewers currently referencing `label`.
    pub fn viewers_referencing(&self, label: &str) -> Vec<&str> {
        self.viewers
            .iter()
            .filter(|(_, s)| s.reference.as_deref() == Some(label))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Forget `label` wherever it appears in viewer state, substituting
    /// `fallback` for references.
    pub fn replace_references(&mut self, label: &str, fallback: Option<&str>) {
        for state in self.viewers.values_mut() {
            if state.reference.as_deref() == Some(label) {
                state.reference = fallback.map(str::to_string);
            }
            if state.last_wcs_reference.as_deref() == Some(label) {
                state.last_wcs_reference = fallback.map(str::to_string);
            }
            state.remove_layer(label);
        }
    }
}

/// Auto-generated label for an orientation built from a rotation and flip
/// sense.
pub fn orientation_label(rotation_angle: f64, east_left: bool) -> String {
    let sense = if east_left { "E-left" } else { "E-right" };
    format!("CCW {rotation_angle:.2} deg ({sense})")
}

/// Total grid rotation for a requested orientation, given the base frame's
/// compass angles.
///
/// A zero requested angle reproduces the base orientation; requesting the
/// base's own North angle yields a North-up frame.
pub fn total_rotation(compass: &CompassInfo, rotation_angle: f64, east_left: bool) -> f64 {
    if east_left {
        -compass.degn + rotation_angle
    } else {
        (180.0 - compass.degn) - rotation_angle
    }
}

/// Build a synthetic orientation dataset: a 2x2 all-NaN layer whose frame is
/// the base frame's sky rotated by `rotation_deg`, with the requested
/// east-west sense.
pub fn build_orientation_dataset(
    base: &Dataset,
    center: SkyCoord,
    pixel_scale: f64,
    rotation_deg: f64,
    east_left: bool,
    label: impl Into<String>,
) -> Dataset {
    let (sin_r, cos_r) = rotation_deg.to_radians().sin_cos();
    let sx = if east_left { -pixel_scale } else { pixel_scale };
    let sy = pixel_scale;
    // R(rot) composed with the axis scales/signs.
    let cd = [[cos_r * sx, -sin_r * sy], [sin_r * sx, cos_r * sy]];

    let shape = (2, 2);
    let projection = TanProjection::new([1.0, 1.0], center, cd);
    Dataset {
        label: label.into(),
        shape,
        components: vec![Component {
            name: "DATA".to_string(),
            values: vec![f64::NAN; 4],
            unit: String::new(),
        }],
        adapter: FrameAdapter::General(GeneralWcs::new(projection, None)),
        origin: DatasetOrigin::Orientation {
            base: base.label.clone(),
        },
    }
}
