//! Shadow Mapping System
//!
//! Shadow rendering for directional, spot and point lights over any
//! [`RenderDevice`](crate::RenderDevice).
//!
//! # Architecture
//!
//! - **Config**: Global settings, shadow/atlas modes and RSM parameters
//! - **Resource**: Per-light target groups with lazy, all-or-nothing creation
//! - **Atlas**: Tile grid and the shared atlas target
//! - **Manager**: Mode dispatch for every light kind
//! - **Cascade**: Standalone cascaded shadow maps
//! - **Data**: GPU-ready data structures for shader uniforms
//!
//! # Usage
//!
//! ```ignore
//! use umbra_render::prelude::*;
//!
//! let config = ShadowConfig::load("shadows.json")?;
//! let programs = ShadowPrograms::compile(&mut device)?;
//! let mut shadows = ShadowManager::new(&config, programs);
//!
//! let mut lights = LightSet::new();
//! let sun = lights.add_directional(DirectionalLight::new("sun", Vec3::new(-0.3, -1.0, -0.2), 2048));
//!
//! // Per frame
//! let report = shadows.render_frame(&mut device, &mut lights, &casters);
//!
//! // Lighting pass
//! let light = lights.directional(sun).unwrap();
//! let info = shadows.shadow_info(&light.shadow, light.light_space);
//! shadows.apply_rsm_uniforms(&mut device, lighting_program);
//! ```
//!
//! # Failure handling
//!
//! A render target that fails its completeness check leaves the light's
//! target group absent and logs an error. The light renders unshadowed; the
//! rest of the frame is unaffected.

pub mod atlas;
pub mod cascade;
pub mod config;
pub mod data;
pub mod error;
pub mod light;
pub mod manager;
pub mod resource;
pub mod targets;

// Re-exports
pub use config::{AtlasMode, RenderConfig, RsmParams, ShadowConfig, ShadowMode, ShadowQuality};

pub use atlas::{AtlasLayout, AtlasRect, ShadowAtlas};

pub use cascade::{CascadeShadowMap, LIGHT_ANCHOR_DISTANCE, MAX_CASCADES};

pub use data::{GpuCascadeData, GpuRsmParams, GpuShadowInfo, SHADOW_MODE_RSM, SHADOW_MODE_STANDARD};

pub use error::{ShadowError, ShadowResult};

pub use light::{CubeShadowView, DirectionalLight, LightId, LightSet, PointLight, SpotLight};

pub use manager::{FrameReport, ShadowManager, ShadowPrograms, ShadowStats};

pub use resource::{LightShadowMap, PointShadowMap, ShadowResource};

pub use targets::{RsmTargets, StandardTargets};
