//! JSON scene descriptions for the CLI and test fixtures.
//!
//! A scene lists datasets with their shapes, values, and frame parameters.
//! This is a description surface for driving a session from the command
//! line, not an instrument-product reader.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::{Component, Dataset, DatasetOrigin};
use crate::error::FramelinkError;
use crate::frame::FrameAdapter;

/// One dataset entry in a scene file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneDataset {
    pub label: String,
    /// Array shape as `[ny, nx]`.
    pub shape: [usize; 2],
    /// Constant fill value used when `values` is absent.
    #[serde(default)]
    pub constant: f64,
    /// Explicit row-major values; must match the shape when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default)]
    pub unit: String,
    pub frame: FrameAdapter,
}

impl SceneDataset {
    pub fn into_dataset(self) -> Dataset {
        let shape = (self.shape[0], self.shape[1]);
        let values = self
            .values
            .unwrap_or_else(|| vec![self.constant; shape.0 * shape.1]);
        Dataset {
            label: self.label,
            shape,
            components: vec![Component {
                name: "DATA".to_string(),
                values,
                unit: self.unit,
            }],
            adapter: self.frame,
            origin: DatasetOrigin::Loaded,
        }
    }
}

/// A complete scene: the datasets to load, in order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scene {
    pub datasets: Vec<SceneDataset>,
}

/// Read a scene from a JSON file.
pub fn read_scene(path: &Path) -> Result<Scene, FramelinkError> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| FramelinkError::SceneParse {
        path: path.to_path_buf(),
        source,
    })
}
