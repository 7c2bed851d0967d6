//! # umbra_render - Shadow Rendering
//!
//! Backend-agnostic shadow rendering with:
//! - Depth-only and reflective shadow maps (RSM)
//! - Per-light targets or a shared shadow atlas
//! - Cube shadow maps for point lights
//! - Cascaded shadow maps for directional lights
//!
//! ## Architecture
//!
//! 1. **Device**: The [`RenderDevice`] trait is the only contact with a
//!    graphics API. Resources are referred to by generational handles.
//! 2. **Shadow**: Light resources, the shadow manager and cascades, all
//!    written against `RenderDevice`.
//! 3. **Headless**: [`HeadlessDevice`] validates and records every command
//!    without a GPU, for tests and tooling.
//!
//! ## Example
//!
//! ```ignore
//! use umbra_render::prelude::*;
//!
//! let mut device = HeadlessDevice::new();
//! let programs = ShadowPrograms::compile(&mut device)?;
//! let mut shadows = ShadowManager::new(&ShadowConfig::default(), programs);
//!
//! shadows.set_atlas_mode(AtlasMode::Atlas);
//! let report = shadows.render_frame(&mut device, &mut lights, &casters);
//! log::info!("{} lights rendered", report.stats.lights_rendered);
//! ```

pub mod caster;
pub mod device;
pub mod handle;
pub mod headless;
pub mod resource;
pub mod shadow;

pub use caster::{MeshCaster, ShadowCaster};
pub use device::{DeviceError, DeviceLimits, RenderDevice};
pub use handle::{Handle, ResourcePool};
pub use headless::{Command, HeadlessDevice};
pub use resource::*;

// Shadow Mapping
pub use shadow::{
    AtlasLayout, AtlasMode, AtlasRect, CascadeShadowMap, CubeShadowView, DirectionalLight,
    FrameReport, GpuRsmParams, GpuShadowInfo, LightId, LightSet, LightShadowMap, PointLight,
    PointShadowMap, RenderConfig, RsmParams, ShadowAtlas, ShadowConfig, ShadowError,
    ShadowManager, ShadowMode, ShadowPrograms, ShadowQuality, ShadowResource, ShadowStats,
    SpotLight,
};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::caster::{MeshCaster, ShadowCaster};
    pub use crate::device::{DeviceError, RenderDevice};
    pub use crate::headless::HeadlessDevice;
    pub use crate::resource::{CubeFace, MeshId, PixelRect, ProgramHandle, TextureHandle};
    pub use crate::shadow::{
        AtlasMode, AtlasRect, CascadeShadowMap, DirectionalLight, LightSet, LightShadowMap,
        PointLight, PointShadowMap, RenderConfig, RsmParams, ShadowConfig, ShadowError,
        ShadowManager, ShadowMode, ShadowPrograms, ShadowQuality, ShadowResource, SpotLight,
    };
    pub use glam::{Mat4, Vec3};
}
