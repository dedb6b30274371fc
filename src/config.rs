//! Session configuration loaded from YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FramelinkError;
use crate::link::{parse_fallback, LinkOptions, LinkType};

/// Linking defaults applied at session startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// 'pixels' or 'wcs'.
    #[serde(default = "default_link_type")]
    pub link_type: String,
    #[serde(default = "default_true")]
    pub wcs_use_affine: bool,
    /// 'none' or 'pixels'.
    #[serde(default = "default_fallback")]
    pub wcs_fallback_scheme: String,
    #[serde(default)]
    pub error_on_fail: bool,
}

fn default_link_type() -> String {
    "pixels".to_string()
}

fn default_fallback() -> String {
    "none".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            link_type: default_link_type(),
            wcs_use_affine: true,
            wcs_fallback_scheme: default_fallback(),
            error_on_fail: false,
        }
    }
}

/// Top-level session configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub linking: LinkingConfig,
}

impl SessionConfig {
    /// Read a configuration from a YAML file.
    pub fn read(path: &Path) -> Result<Self, FramelinkError> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| FramelinkError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate and convert the linking section into typed options.
    pub fn link_options(&self) -> Result<LinkOptions, FramelinkError> {
        Ok(LinkOptions {
            link_type: LinkType::parse(&self.linking.link_type)?,
            wcs_fallback_scheme: parse_fallback(&self.linking.wcs_fallback_scheme)?,
            wcs_use_affine: self.linking.wcs_use_affine,
            error_on_fail: self.linking.error_on_fail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        let options = config.link_options().unwrap();
        assert_eq!(options.link_type, LinkType::Pixels);
        assert!(options.wcs_use_affine);
        assert!(options.wcs_fallback_scheme.is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let text = "linking:\n  link_type: wcs\n  wcs_fallback_scheme: pixels\n";
        let config: SessionConfig = serde_yaml::from_str(text).unwrap();
        let options = config.link_options().unwrap();
        assert_eq!(options.link_type, LinkType::Wcs);
        assert!(options.wcs_fallback_scheme.is_some());
    }

    #[test]
    fn test_invalid_link_type_rejected() {
        let text = "linking:\n  link_type: foo\n";
        let config: SessionConfig = serde_yaml::from_str(text).unwrap();
        let err = config.link_options().unwrap_err();
        assert!(err.to_string().contains("link_type"));
    }
}
