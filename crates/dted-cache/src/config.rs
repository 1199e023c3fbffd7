//! YAML configuration for the frame cache and shading.
//!
//! ```yaml
//! dted_paths: [/data/dted]
//! dted2_paths: [/data/dted2]
//! cache_size: 20
//! shading:
//!   mode: colored
//!   band_height: 25
//!   level: 1
//!   contrast: 3
//!   num_colors: 216
//!   opaqueness: 255
//!   color_model: indexed
//! ```
//!
//! Every field is optional.

use crate::cache::{FrameCache, DEFAULT_CACHE_SIZE};
use crate::colortable::{ColorTable, DEFAULT_NUM_COLORS, DEFAULT_OPAQUENESS, MAX_NUM_COLORS};
use crate::subframe::{ColorModel, ShadingMode, SubframeInfo, DEFAULT_BAND_HEIGHT, DEFAULT_CONTRAST};
use crate::{DtedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DtedConfig {
    /// Search roots for level 0 and 1 frames.
    pub dted_paths: Vec<PathBuf>,
    /// Search roots for level 2 frames.
    pub dted2_paths: Vec<PathBuf>,
    /// Frame cache capacity; 0 selects the default.
    pub cache_size: usize,
    pub shading: ShadingConfig,
}

impl Default for DtedConfig {
    fn default() -> Self {
        Self {
            dted_paths: Vec::new(),
            dted2_paths: Vec::new(),
            cache_size: DEFAULT_CACHE_SIZE,
            shading: ShadingConfig::default(),
        }
    }
}

/// Shading parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadingConfig {
    pub mode: ShadingMode,
    /// Meters or feet per band in the band modes.
    pub band_height: i32,
    /// DTED level to render, 0 to 2.
    pub level: u8,
    /// 1 to 5.
    pub contrast: u8,
    /// Greyscale palette size, 2 to 255.
    pub num_colors: usize,
    pub opaqueness: u8,
    pub color_model: ColorModel,
}

impl Default for ShadingConfig {
    fn default() -> Self {
        Self {
            mode: ShadingMode::default(),
            band_height: DEFAULT_BAND_HEIGHT,
            level: 1,
            contrast: DEFAULT_CONTRAST,
            num_colors: DEFAULT_NUM_COLORS,
            opaqueness: DEFAULT_OPAQUENESS,
            color_model: ColorModel::default(),
        }
    }
}

impl ShadingConfig {
    /// Subframe template carrying these shading parameters.
    pub fn subframe_info(&self) -> SubframeInfo {
        SubframeInfo {
            mode: self.mode,
            band_height: self.band_height,
            level: self.level,
            contrast: self.contrast,
            color_model: self.color_model,
            ..SubframeInfo::default()
        }
    }

    /// Colour table for these parameters.
    pub fn color_table(&self) -> ColorTable {
        ColorTable::new(self.num_colors, self.opaqueness)
    }
}

impl DtedConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let shading = &self.shading;
        if !(1..=5).contains(&shading.contrast) {
            return Err(DtedError::InvalidConfig(format!(
                "contrast must be between 1 and 5, got {}",
                shading.contrast
            )));
        }
        if shading.level > 2 {
            return Err(DtedError::InvalidConfig(format!(
                "level must be 0, 1 or 2, got {}",
                shading.level
            )));
        }
        if !(2..=MAX_NUM_COLORS).contains(&shading.num_colors) {
            return Err(DtedError::InvalidConfig(format!(
                "num_colors must be between 2 and {}, got {}",
                MAX_NUM_COLORS,
                shading.num_colors
            )));
        }
        if shading.band_height < 0 {
            return Err(DtedError::InvalidConfig(format!(
                "band_height must not be negative, got {}",
                shading.band_height
            )));
        }
        Ok(())
    }

    /// Frame cache over the configured search roots.
    pub fn frame_cache(&self) -> FrameCache {
        FrameCache::new(self.dted_paths.clone(), self.dted2_paths.clone(), self.cache_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DtedConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, DtedConfig::default());
        assert_eq!(config.cache_size, 20);
        assert_eq!(config.shading.mode, ShadingMode::Slope);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
dted_paths: [/data/dted, /mnt/dted]
dted2_paths: [/data/dted2]
cache_size: 8
shading:
  mode: feet_band
  band_height: 100
  level: 2
  contrast: 5
  num_colors: 32
  opaqueness: 128
  color_model: direct
"#;
        let config = DtedConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.dted_paths.len(), 2);
        assert_eq!(config.cache_size, 8);
        assert_eq!(config.shading.mode, ShadingMode::FeetBand);
        assert_eq!(config.shading.color_model, ColorModel::Direct);

        let info = config.shading.subframe_info();
        assert_eq!(info.band_height, 100);
        assert_eq!(info.level, 2);
        assert_eq!(config.shading.color_table().num_colors(), 32);

        let again = DtedConfig::from_yaml_str(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for yaml in [
            "shading: {contrast: 0}",
            "shading: {contrast: 6}",
            "shading: {level: 3}",
            "shading: {num_colors: 1}",
            "shading: {num_colors: 256}",
            "shading: {num_colors: 300}",
            "shading: {band_height: -5}",
        ] {
            let err = DtedConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, DtedError::InvalidConfig(_)), "{yaml}");
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = DtedConfig::from_yaml_str("cache: 3").unwrap_err();
        assert!(matches!(err, DtedError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dted.yaml");
        std::fs::write(&path, "cache_size: 3\n").unwrap();
        assert_eq!(DtedConfig::load(&path).unwrap().cache_size, 3);
        assert!(matches!(DtedConfig::load(dir.path().join("missing.yaml")), Err(DtedError::Io(_))));
    }
}
