//! The dataset collection: labeled datasets, their components, and the
//! subset groups anchored to them.

use serde::{Deserialize, Serialize};

use crate::error::FramelinkError;
use crate::frame::FrameAdapter;

/// A named array belonging to a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// Row-major values, `shape.0 * shape.1` long.
    pub values: Vec<f64>,
    /// Physical unit of the values, empty when unitless.
    #[serde(default)]
    pub unit: String,
}

/// How a dataset entered the collection.
///
/// Synthetic orientation layers are a distinct entity kind, not a
/// label-matching convention: they reference the base dataset they were
/// derived from and own no real pixel data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DatasetOrigin {
    /// Loaded by the user.
    Loaded,
    /// Synthetic orientation layer derived from `base`.
    Orientation { base: String },
}

impl DatasetOrigin {
    #[inline]
    pub fn is_orientation(&self) -> bool {
        matches!(self, Self::Orientation { .. })
    }
}

/// An entry in the collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    /// Array shape as `(ny, nx)`.
    pub shape: (usize, usize),
    pub components: Vec<Component>,
    pub adapter: FrameAdapter,
    pub origin: DatasetOrigin,
}

impl Dataset {
    /// Create a loaded dataset with a single constant-valued component.
    pub fn filled(
        label: impl Into<String>,
        shape: (usize, usize),
        value: f64,
        unit: impl Into<String>,
        adapter: FrameAdapter,
    ) -> Self {
        Self {
            label: label.into(),
            shape,
            components: vec![Component {
                name: "DATA".to_string(),
                values: vec![value; shape.0 * shape.1],
                unit: unit.into(),
            }],
            adapter,
            origin: DatasetOrigin::Loaded,
        }
    }

    /// Value of the primary component at the nearest pixel, `None` when the
    /// position rounds outside the array or there is no component.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let comp = self.components.first()?;
        let ix = x.round();
        let iy = y.round();
        let (ny, nx) = self.shape;
        if ix < 0.0 || iy < 0.0 || ix >= nx as f64 || iy >= ny as f64 {
            return None;
        }
        comp.values.get(iy as usize * nx + ix as usize).copied()
    }

    /// Unit of the primary component.
    pub fn unit(&self) -> &str {
        self.components.first().map_or("", |c| c.unit.as_str())
    }

    /// Whether the position rounds to a pixel inside the array.
    pub fn contains_pixel(&self, x: f64, y: f64) -> bool {
        let (ny, nx) = self.shape;
        let ix = x.round();
        let iy = y.round();
        ix >= 0.0 && iy >= 0.0 && ix < nx as f64 && iy < ny as f64
    }
}

/// A user-defined region of interest.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Region {
    Circle { xc: f64, yc: f64, radius: f64 },
    Rectangle { xmin: f64, ymin: f64, xmax: f64, ymax: f64 },
    Ellipse { xc: f64, yc: f64, a: f64, b: f64, theta: f64 },
}

impl Region {
    /// Center of the region in its parent frame.
    pub fn center(&self) -> (f64, f64) {
        match *self {
            Self::Circle { xc, yc, .. } | Self::Ellipse { xc, yc, .. } => (xc, yc),
            Self::Rectangle {
                xmin,
                ymin,
                xmax,
                ymax,
            } => ((xmin + xmax) * 0.5, (ymin + ymax) * 0.5),
        }
    }

    /// Re-express the region about a new center, rotating by `dtheta`
    /// radians where the shape carries an angle.
    pub fn recentered(&self, xc_new: f64, yc_new: f64, dtheta: f64) -> Self {
        match *self {
            Self::Circle { radius, .. } => Self::Circle {
                xc: xc_new,
                yc: yc_new,
                radius,
            },
            Self::Rectangle {
                xmin,
                ymin,
                xmax,
                ymax,
            } => {
                let w = xmax - xmin;
                let h = ymax - ymin;
                Self::Rectangle {
                    xmin: xc_new - w * 0.5,
                    ymin: yc_new - h * 0.5,
                    xmax: xc_new + w * 0.5,
                    ymax: yc_new + h * 0.5,
                }
            }
            Self::Ellipse { a, b, theta, .. } => Self::Ellipse {
                xc: xc_new,
                yc: yc_new,
                a,
                b,
                theta: theta + dtheta,
            },
        }
    }
}

/// A subset: region geometry plus the dataset whose frame it is defined in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsetGroup {
    pub label: String,
    /// Label of the parent dataset the geometry is expressed against.
    pub parent: String,
    pub region: Region,
}

/// Label-unique, insertion-ordered store of datasets.
#[derive(Clone, Debug, Default)]
pub struct DataCollection {
    datasets: Vec<Dataset>,
    pub subset_groups: Vec<SubsetGroup>,
}

impl DataCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset. Labels are unique within the collection.
    pub fn add(&mut self, dataset: Dataset) -> Result<(), FramelinkError> {
        if self.get(&dataset.label).is_some() {
            return Err(FramelinkError::InvalidParameter {
                parameter: "label",
                value: dataset.label,
                allowed: "labels unique within the collection",
            });
        }
        self.datasets.push(dataset);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.label == label)
    }

    /// Remove a dataset by label, returning it.
    pub fn remove(&mut self, label: &str) -> Option<Dataset> {
        let idx = self.datasets.iter().position(|d| d.label == label)?;
        Some(self.datasets.remove(idx))
    }

    pub fn list_labels(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// First user-loaded dataset, the anchor for pixel linking.
    pub fn first_loaded(&self) -> Option<&Dataset> {
        self.datasets.iter().find(|d| !d.origin.is_orientation())
    }

    /// First user-loaded dataset carrying a celestial frame.
    pub fn first_celestial(&self) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|d| !d.origin.is_orientation() && d.adapter.has_valid_wcs())
    }

    /// Labels of synthetic orientation layers, in insertion order.
    pub fn orientation_labels(&self) -> Vec<&str> {
        self.datasets
            .iter()
            .filter(|d| d.origin.is_orientation())
            .map(|d| d.label.as_str())
            .collect()
    }
}
