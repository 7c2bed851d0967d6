//! GPU Shadow Data Structures
//!
//! Uniform blocks the lighting pass reads to sample shadow maps. All
//! structures are bytemuck Pod/Zeroable for direct upload.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use super::atlas::AtlasRect;
use super::config::{RsmParams, ShadowMode};

/// `GpuShadowInfo::mode` for depth-only maps
pub const SHADOW_MODE_STANDARD: u32 = 0;
/// `GpuShadowInfo::mode` for reflective shadow maps
pub const SHADOW_MODE_RSM: u32 = 1;

/// Per-light shadow sampling data
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowInfo {
    /// Light-space view-projection matrix
    pub light_space: [[f32; 4]; 4],

    /// Atlas tile `[x, y, width, height]`; the full texture outside atlas mode
    pub atlas_rect: [f32; 4],

    /// 1.0 / shadow map resolution in texels
    pub texel_size: f32,

    /// `SHADOW_MODE_STANDARD` or `SHADOW_MODE_RSM`
    pub mode: u32,

    /// Non-zero when the map lives in the shared atlas
    pub in_atlas: u32,

    /// Non-zero when a valid shadow map exists
    pub enabled: u32,
}

impl GpuShadowInfo {
    /// Light without a usable shadow map
    pub fn disabled() -> Self {
        Self {
            atlas_rect: AtlasRect::full().to_array(),
            ..Default::default()
        }
    }

    pub fn new(light_space: Mat4, mode: ShadowMode, atlas_rect: Option<AtlasRect>, resolution: u32) -> Self {
        Self {
            light_space: light_space.to_cols_array_2d(),
            atlas_rect: atlas_rect.unwrap_or_else(AtlasRect::full).to_array(),
            texel_size: 1.0 / resolution.max(1) as f32,
            mode: match mode {
                ShadowMode::Standard => SHADOW_MODE_STANDARD,
                ShadowMode::Rsm => SHADOW_MODE_RSM,
            },
            in_atlas: atlas_rect.is_some() as u32,
            enabled: 1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }

    pub fn light_space_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_space)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// RSM sampling parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuRsmParams {
    pub smoothness: f32,
    pub bias: f32,
    pub radius: f32,
    pub intensity: f32,
}

impl From<RsmParams> for GpuRsmParams {
    fn from(params: RsmParams) -> Self {
        Self {
            smoothness: params.smoothness,
            bias: params.bias,
            radius: params.radius,
            intensity: params.intensity,
        }
    }
}

/// Cascaded shadow data for one directional light
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCascadeData {
    /// One light-space matrix per cascade
    pub matrices: [[[f32; 4]; 4]; 4],

    /// Far view-space distance of each cascade
    pub splits: [f32; 4],

    pub cascade_count: u32,

    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn test_gpu_struct_sizes() {
        assert_eq!(size_of::<GpuShadowInfo>(), 96);
        assert_eq!(size_of::<GpuRsmParams>(), 16);
        assert_eq!(size_of::<GpuCascadeData>() % 16, 0);
    }

    #[test]
    fn test_shadow_info_disabled() {
        let info = GpuShadowInfo::disabled();
        assert!(!info.is_enabled());
        assert_eq!(info.atlas_rect, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_shadow_info_in_atlas() {
        let rect = AtlasRect::new(0.5, 0.0, 0.5, 0.5);
        let info = GpuShadowInfo::new(Mat4::IDENTITY, ShadowMode::Rsm, Some(rect), 1024);

        assert!(info.is_enabled());
        assert_eq!(info.mode, SHADOW_MODE_RSM);
        assert_eq!(info.in_atlas, 1);
        assert_eq!(info.atlas_rect, [0.5, 0.0, 0.5, 0.5]);
        assert_eq!(info.texel_size, 1.0 / 1024.0);
        assert_eq!(info.light_space_matrix(), Mat4::IDENTITY);
        assert_eq!(info.as_bytes().len(), 96);
    }

    #[test]
    fn test_rsm_params_conversion() {
        let gpu = GpuRsmParams::from(RsmParams::default());
        assert_eq!(bytemuck::cast::<GpuRsmParams, [f32; 4]>(gpu), [0.5, 0.05, 0.1, 1.0]);
    }
}
