use std::path::PathBuf;
use thiserror::Error;

/// The main error type for framelink operations.
#[derive(Debug, Error)]
pub enum FramelinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A linking parameter received a value outside its allowed set.
    ///
    /// Always surfaced immediately; never absorbed by a fallback scheme.
    #[error("invalid value '{value}' for {parameter} (allowed: {allowed})")]
    InvalidParameter {
        parameter: &'static str,
        value: String,
        allowed: &'static str,
    },

    /// A dataset lacks the celestial coordinate frame required by the
    /// requested linking scheme.
    #[error(
        "'{label}' is missing a valid WCS; WCS linking is only possible \
         if all data have valid WCS"
    )]
    MissingCoordinateFrame { label: String },

    /// A link-graph query referenced a dataset or pair with no recorded
    /// relation.
    #[error("{0}")]
    LinkLookup(String),

    /// A state transition was rejected because it would invalidate live
    /// entities (markers pinning the link type, or an orientation still in
    /// use with no fallback). The operation is fully rejected; no partial
    /// mutation occurs.
    #[error("{0}")]
    UnsafeStateTransition(String),

    #[error("Failed to parse scene JSON from {path}: {source}")]
    SceneParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse config YAML from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl FramelinkError {
    /// Lookup error for a dataset label with no entry in the link graph.
    pub fn label_not_linked(label: &str) -> Self {
        Self::LinkLookup(format!(
            "'{label}' not found in data collection external links"
        ))
    }

    /// Lookup error for a dataset pair with no recorded relation.
    pub fn pair_not_linked(a: &str, b: &str) -> Self {
        Self::LinkLookup(format!(
            "'{a}' and '{b}' combo not found in data collection external links"
        ))
    }

    /// Lookup error raised when no reference dataset exists yet.
    pub fn no_reference() -> Self {
        Self::LinkLookup("No reference data for link look-up".to_string())
    }
}
