//! Shadow Configuration
//!
//! Mode enums, the per-frame mode snapshot and the JSON-loadable settings
//! a [`ShadowManager`](super::ShadowManager) is created from.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::cascade::MAX_CASCADES;
use super::error::{ShadowError, ShadowResult};

/// Shadow rendering algorithm
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowMode {
    /// Depth-only shadow map
    #[default]
    Standard,
    /// Reflective shadow map: depth plus world normal and flux
    Rsm,
}

/// Shadow map storage strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtlasMode {
    /// Each light owns its render targets
    #[default]
    Individual,
    /// Directional and spot lights share tiles of one large texture
    Atlas,
}

/// Immutable snapshot of the active modes for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderConfig {
    pub shadow_mode: ShadowMode,
    pub atlas_mode: AtlasMode,
}

impl RenderConfig {
    pub fn new(shadow_mode: ShadowMode, atlas_mode: AtlasMode) -> Self {
        Self {
            shadow_mode,
            atlas_mode,
        }
    }

    pub fn is_rsm(&self) -> bool {
        self.shadow_mode == ShadowMode::Rsm
    }

    pub fn is_atlas(&self) -> bool {
        self.atlas_mode == AtlasMode::Atlas
    }
}

/// Reflective shadow map sampling parameters, shared by all lights
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsmParams {
    pub smoothness: f32,
    pub bias: f32,
    /// Sampling radius in shadow-map UV space
    pub radius: f32,
    /// Indirect light multiplier
    pub intensity: f32,
}

impl Default for RsmParams {
    fn default() -> Self {
        Self {
            smoothness: 0.5,
            bias: 0.05,
            radius: 0.1,
            intensity: 1.0,
        }
    }
}

impl RsmParams {
    fn validate(&mut self) {
        self.smoothness = self.smoothness.clamp(0.0, 1.0);
        self.bias = self.bias.max(0.0);
        self.radius = self.radius.max(0.0);
        self.intensity = self.intensity.max(0.0);
    }
}

/// Global shadow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Enable shadows globally
    pub enabled: bool,

    /// Initial shadow algorithm
    pub shadow_mode: ShadowMode,

    /// Initial storage strategy
    pub atlas_mode: AtlasMode,

    /// Per-light shadow map resolution (power of 2)
    pub default_resolution: u32,

    /// Edge length of one atlas tile (power of 2)
    pub atlas_tile_resolution: u32,

    /// Cascade count for directional lights (1-4)
    pub cascade_count: u32,

    /// Cascade split lambda (0 = linear, 1 = logarithmic)
    pub cascade_lambda: f32,

    /// Maximum shadow distance from camera
    pub shadow_distance: f32,

    /// Skip casters whose bounds fall outside the light frustum
    pub cull_casters: bool,

    pub rsm: RsmParams,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shadow_mode: ShadowMode::Standard,
            atlas_mode: AtlasMode::Individual,
            default_resolution: 2048,
            atlas_tile_resolution: 1024,
            cascade_count: 4,
            cascade_lambda: 0.5,
            shadow_distance: 100.0,
            cull_casters: true,
            rsm: RsmParams::default(),
        }
    }
}

impl ShadowConfig {
    /// 4096 px per-light maps, 2048 px atlas tiles, splits biased toward the camera
    pub fn high_quality() -> Self {
        Self {
            default_resolution: 4096,
            atlas_tile_resolution: 2048,
            cascade_lambda: 0.75,
            ..Default::default()
        }
    }

    /// Packs directional and spot lights into one atlas of 512 px tiles
    ///
    /// Two cascades cover half the default distance.
    pub fn low_quality() -> Self {
        Self {
            atlas_mode: AtlasMode::Atlas,
            default_resolution: 1024,
            atlas_tile_resolution: 512,
            cascade_count: 2,
            shadow_distance: 50.0,
            ..Default::default()
        }
    }

    /// Lights render unshadowed and no shadow targets are created
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> ShadowResult<Self> {
        let mut config: ShadowConfig = serde_json::from_str(json)?;
        config.validate();
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> ShadowResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ShadowError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        log::debug!("Loaded shadow config from {}", path.display());
        Ok(config)
    }

    /// Pull every field into the range the renderer accepts
    ///
    /// Resolutions snap up to a power of two within `256..=8192`.
    pub fn validate(&mut self) {
        let snap = |resolution: u32| resolution.clamp(256, 8192).next_power_of_two();
        self.default_resolution = snap(self.default_resolution);
        self.atlas_tile_resolution = snap(self.atlas_tile_resolution);
        self.cascade_count = self.cascade_count.clamp(1, MAX_CASCADES as u32);
        self.cascade_lambda = self.cascade_lambda.clamp(0.0, 1.0);
        self.shadow_distance = self.shadow_distance.max(1.0);
        self.rsm.validate();
    }

    /// Modes this configuration starts with
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.shadow_mode, self.atlas_mode)
    }
}

/// Named presets for a settings menu
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowQuality {
    Off,
    /// Atlas-packed depth tiles
    Low,
    /// Per-light depth maps at 2048 px
    Medium,
    High,
    /// Reflective shadow maps for one-bounce indirect light
    Ultra,
}

impl ShadowQuality {
    pub fn to_config(self) -> ShadowConfig {
        match self {
            Self::Off => ShadowConfig::disabled(),
            Self::Low => ShadowConfig::low_quality(),
            Self::Medium => ShadowConfig::default(),
            Self::High => ShadowConfig::high_quality(),
            Self::Ultra => ShadowConfig {
                shadow_mode: ShadowMode::Rsm,
                default_resolution: 4096,
                atlas_tile_resolution: 2048,
                cascade_lambda: 0.8,
                shadow_distance: 150.0,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_shadow_config_default() {
        let config = ShadowConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_resolution, 2048);
        assert_eq!(config.render_config(), RenderConfig::default());
        assert_eq!(config.rsm, RsmParams::default());
    }

    #[test]
    fn test_rsm_defaults() {
        let rsm = RsmParams::default();
        assert_eq!(rsm.smoothness, 0.5);
        assert_eq!(rsm.bias, 0.05);
        assert_eq!(rsm.radius, 0.1);
        assert_eq!(rsm.intensity, 1.0);
    }

    #[test]
    fn test_shadow_config_validate() {
        let mut config = ShadowConfig {
            default_resolution: 1000,
            atlas_tile_resolution: 64,
            cascade_count: 10,
            cascade_lambda: 2.0,
            rsm: RsmParams {
                intensity: -3.0,
                ..Default::default()
            },
            ..Default::default()
        };

        config.validate();

        assert_eq!(config.default_resolution, 1024);
        assert_eq!(config.atlas_tile_resolution, 256);
        assert_eq!(config.cascade_count, 4);
        assert_eq!(config.cascade_lambda, 1.0);
        assert_eq!(config.rsm.intensity, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "shadow_mode": "Rsm", "atlas_mode": "Atlas", "rsm": { "radius": 0.25 } }"#;
        let config = ShadowConfig::from_json_str(json).unwrap();

        assert_eq!(config.shadow_mode, ShadowMode::Rsm);
        assert_eq!(config.atlas_mode, AtlasMode::Atlas);
        assert_eq!(config.rsm.radius, 0.25);
        assert_eq!(config.rsm.bias, 0.05);
        assert_eq!(config.default_resolution, 2048);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = ShadowConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ShadowError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = ShadowQuality::Ultra.to_config();
        write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = ShadowConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShadowConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ShadowError::ConfigIo { .. }));
    }

    #[test]
    fn test_shadow_quality_presets() {
        assert!(!ShadowQuality::Off.to_config().enabled);
        assert_eq!(ShadowQuality::Low.to_config().atlas_mode, AtlasMode::Atlas);

        let ultra = ShadowQuality::Ultra.to_config();
        assert_eq!(ultra.shadow_mode, ShadowMode::Rsm);
        assert_eq!(ultra.default_resolution, 4096);
    }
}
