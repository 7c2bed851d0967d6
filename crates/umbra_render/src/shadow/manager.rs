//! Shadow Manager
//!
//! Dispatches shadow rendering for every light kind according to the
//! current `(ShadowMode, AtlasMode)` pair. Per-light targets are created
//! lazily on the first render that needs them; the shared atlas is created
//! by [`ShadowManager::allocate_atlas_space`].
//!
//! | Mode                  | Directional / spot                         | Point                |
//! |-----------------------|--------------------------------------------|----------------------|
//! | Standard + Individual | light's depth target                       | light's depth cube   |
//! | RSM + Individual      | light's normal/flux/depth targets          | light's RSM cubes    |
//! | Standard + Atlas      | atlas tile, depth only                     | light's depth cube   |
//! | RSM + Atlas           | atlas tile, normal/flux/depth              | light's RSM cubes    |

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use umbra_math::Frustum;

use crate::caster::ShadowCaster;
use crate::device::RenderDevice;
use crate::resource::{ClearFlags, CubeFace, PixelRect, ProgramHandle, ProgramSource, UniformValue};

use super::atlas::{AtlasLayout, AtlasRect, ShadowAtlas};
use super::config::{AtlasMode, RenderConfig, RsmParams, ShadowConfig, ShadowMode};
use super::data::{GpuRsmParams, GpuShadowInfo};
use super::error::{ShadowError, ShadowResult};
use super::light::{CubeShadowView, LightId, LightSet};
use super::resource::{LightShadowMap, PointShadowMap, ShadowResource};
use super::targets::RSM_DRAW_BUFFERS;

const SHADOW_DEPTH_VERT: &str = include_str!("../../shaders/shadow_depth.vert");
const SHADOW_DEPTH_FRAG: &str = include_str!("../../shaders/shadow_depth.frag");
const ATLAS_DEPTH_FRAG: &str = include_str!("../../shaders/atlas_depth.frag");
const RSM_VERT: &str = include_str!("../../shaders/rsm.vert");
const RSM_FRAG: &str = include_str!("../../shaders/rsm.frag");

/// Programs for the three shadow passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowPrograms {
    /// Depth-only pass into a light's own target
    pub standard: ProgramHandle,
    /// Normal + flux + depth pass
    pub rsm: ProgramHandle,
    /// Depth-only pass into an atlas tile
    pub atlas: ProgramHandle,
}

impl ShadowPrograms {
    /// Built-in GLSL sources, in `standard, rsm, atlas` order
    pub fn sources() -> [ProgramSource; 3] {
        [
            ProgramSource::new("shadow depth", SHADOW_DEPTH_VERT, SHADOW_DEPTH_FRAG),
            ProgramSource::new("reflective shadow map", RSM_VERT, RSM_FRAG),
            ProgramSource::new("shadow atlas depth", SHADOW_DEPTH_VERT, ATLAS_DEPTH_FRAG),
        ]
    }

    /// Compile the built-in programs
    pub fn compile(device: &mut dyn RenderDevice) -> ShadowResult<Self> {
        let mut compiled = Vec::with_capacity(3);
        for source in Self::sources() {
            match device.compile_program(&source) {
                Ok(program) => compiled.push(program),
                Err(err) => {
                    log::error!("Failed to compile '{}': {}", source.label, err);
                    for program in compiled {
                        device.destroy_program(program);
                    }
                    return Err(err.into());
                }
            }
        }

        Ok(Self {
            standard: compiled[0],
            rsm: compiled[1],
            atlas: compiled[2],
        })
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        device.destroy_program(self.standard);
        device.destroy_program(self.rsm);
        device.destroy_program(self.atlas);
    }
}

/// Counters for the current frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowStats {
    /// Lights whose shadow pass completed
    pub lights_rendered: u32,
    /// Lights skipped because their targets could not be created
    pub lights_failed: u32,
    /// Cube faces rendered for point lights
    pub faces_rendered: u32,
    pub casters_drawn: u32,
    /// Casters outside the light frustum
    pub casters_culled: u32,
    pub atlas_tiles_used: u32,
}

/// Outcome of [`ShadowManager::render_frame`]
#[derive(Debug)]
pub struct FrameReport {
    /// Modes the frame was rendered with
    pub config: RenderConfig,
    pub stats: ShadowStats,
    /// Lights that rendered without a shadow this frame
    pub failures: Vec<(LightId, ShadowError)>,
    /// Set when the atlas could not be allocated
    pub atlas_error: Option<ShadowError>,
}

impl FrameReport {
    fn new(config: RenderConfig) -> Self {
        Self {
            config,
            stats: ShadowStats::default(),
            failures: Vec::new(),
            atlas_error: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.atlas_error.is_none()
    }
}

/// Point-light parameters of a pass
#[derive(Clone, Copy)]
struct PointPass {
    position: Vec3,
    far_plane: f32,
}

/// Orchestrates shadow rendering for all lights
#[derive(Debug)]
pub struct ShadowManager {
    enabled: bool,
    shadow_mode: ShadowMode,
    atlas_mode: AtlasMode,
    rsm: RsmParams,
    cull_casters: bool,
    atlas_tile_resolution: u32,
    atlas: Option<ShadowAtlas>,
    /// Bumped whenever the atlas is recreated or released
    atlas_generation: u32,
    programs: ShadowPrograms,
    stats: ShadowStats,
}

impl ShadowManager {
    pub fn new(config: &ShadowConfig, programs: ShadowPrograms) -> Self {
        Self {
            enabled: config.enabled,
            shadow_mode: config.shadow_mode,
            atlas_mode: config.atlas_mode,
            rsm: config.rsm,
            cull_casters: config.cull_casters,
            atlas_tile_resolution: config.atlas_tile_resolution,
            atlas: None,
            atlas_generation: 0,
            programs,
            stats: ShadowStats::default(),
        }
    }

    /// Take over settings from a reloaded configuration
    ///
    /// Takes effect on the next render; existing targets are kept.
    pub fn apply_config(&mut self, config: &ShadowConfig) {
        self.enabled = config.enabled;
        self.shadow_mode = config.shadow_mode;
        self.atlas_mode = config.atlas_mode;
        self.rsm = config.rsm;
        self.cull_casters = config.cull_casters;
        self.atlas_tile_resolution = config.atlas_tile_resolution;
    }

    // Modes

    pub fn set_shadow_mode(&mut self, mode: ShadowMode) {
        if mode != self.shadow_mode {
            log::debug!("Shadow mode {:?} -> {:?}", self.shadow_mode, mode);
        }
        self.shadow_mode = mode;
    }

    pub fn shadow_mode(&self) -> ShadowMode {
        self.shadow_mode
    }

    pub fn set_atlas_mode(&mut self, mode: AtlasMode) {
        if mode != self.atlas_mode {
            log::debug!("Atlas mode {:?} -> {:?}", self.atlas_mode, mode);
        }
        self.atlas_mode = mode;
    }

    pub fn atlas_mode(&self) -> AtlasMode {
        self.atlas_mode
    }

    /// Snapshot of the current modes for one frame
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.shadow_mode, self.atlas_mode)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_cull_casters(&mut self, cull: bool) {
        self.cull_casters = cull;
    }

    // RSM parameters

    pub fn set_rsm_params(&mut self, params: RsmParams) {
        self.rsm = params;
    }

    pub fn rsm_params(&self) -> RsmParams {
        self.rsm
    }

    pub fn set_rsm_smoothness(&mut self, smoothness: f32) {
        self.rsm.smoothness = smoothness;
    }

    pub fn rsm_smoothness(&self) -> f32 {
        self.rsm.smoothness
    }

    pub fn set_rsm_bias(&mut self, bias: f32) {
        self.rsm.bias = bias;
    }

    pub fn rsm_bias(&self) -> f32 {
        self.rsm.bias
    }

    pub fn set_rsm_radius(&mut self, radius: f32) {
        self.rsm.radius = radius;
    }

    pub fn rsm_radius(&self) -> f32 {
        self.rsm.radius
    }

    pub fn set_rsm_intensity(&mut self, intensity: f32) {
        self.rsm.intensity = intensity;
    }

    pub fn rsm_intensity(&self) -> f32 {
        self.rsm.intensity
    }

    // Atlas

    /// Size the shared atlas for `light_count` tiles of `resolution` pixels
    ///
    /// No-op when the current atlas was allocated with the same arguments.
    pub fn allocate_atlas_space(
        &mut self,
        device: &mut dyn RenderDevice,
        light_count: u32,
        resolution: u32,
    ) -> ShadowResult<()> {
        if let Some(atlas) = &self.atlas {
            if atlas.matches(light_count, resolution) {
                return Ok(());
            }
        }
        if let Some(old) = self.atlas.take() {
            old.destroy(device);
        }
        self.atlas_generation = self.atlas_generation.wrapping_add(1);

        let layout = AtlasLayout::for_light_count(light_count, resolution);
        self.atlas = Some(ShadowAtlas::create(device, layout)?);
        Ok(())
    }

    /// Normalized tile of slot `index` in the current atlas
    pub fn atlas_rect(&self, index: u32) -> Option<AtlasRect> {
        self.atlas.as_ref().and_then(|atlas| atlas.layout().rect(index))
    }

    pub fn atlas(&self) -> Option<&ShadowAtlas> {
        self.atlas.as_ref()
    }

    pub fn atlas_layout(&self) -> Option<&AtlasLayout> {
        self.atlas.as_ref().map(ShadowAtlas::layout)
    }

    /// Changes each time the atlas is recreated; tiles from older
    /// generations no longer hold a shadow
    pub fn atlas_generation(&self) -> u32 {
        self.atlas_generation
    }

    pub fn atlas_tile_resolution(&self) -> u32 {
        self.atlas_tile_resolution
    }

    pub fn set_atlas_tile_resolution(&mut self, resolution: u32) {
        self.atlas_tile_resolution = resolution;
    }

    // Rendering

    /// Render a directional light's shadow
    ///
    /// `atlas_slot` selects the atlas tile and is ignored in individual mode.
    pub fn render_directional(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut LightShadowMap,
        light_space: Mat4,
        casters: &[&dyn ShadowCaster],
        atlas_slot: usize,
    ) -> ShadowResult<()> {
        self.render_planar(device, config, shadow, light_space, casters, atlas_slot)
    }

    /// Render a spot light's shadow
    pub fn render_spot(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut LightShadowMap,
        light_space: Mat4,
        casters: &[&dyn ShadowCaster],
        atlas_slot: usize,
    ) -> ShadowResult<()> {
        self.render_planar(device, config, shadow, light_space, casters, atlas_slot)
    }

    /// Render all six faces of a point light's cube shadow
    ///
    /// Point lights are never packed into the atlas; in atlas mode they
    /// render to their own cube targets.
    pub fn render_point(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut PointShadowMap,
        view: &CubeShadowView,
        casters: &[&dyn ShadowCaster],
    ) -> ShadowResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let result = self.render_cube(device, config, shadow, view, casters);
        if result.is_err() {
            shadow.mark_failed();
        }
        self.record(shadow.label(), &result);
        result
    }

    /// Render every light in `lights` with one mode snapshot
    ///
    /// Atlas slots go to directional lights in id order, then spot lights,
    /// so no two lights of a frame share a tile. A failing light is logged
    /// and reported; the rest of the frame still renders.
    pub fn render_frame(
        &mut self,
        device: &mut dyn RenderDevice,
        lights: &mut LightSet,
        casters: &[&dyn ShadowCaster],
    ) -> FrameReport {
        self.stats = ShadowStats::default();
        let config = self.render_config();
        let mut report = FrameReport::new(config);
        if !self.enabled {
            return report;
        }

        if config.is_atlas() {
            let count = lights.atlas_light_count() as u32;
            if let Err(err) = self.allocate_atlas_space(device, count, self.atlas_tile_resolution) {
                log::error!("Shadow atlas allocation failed: {}", err);
                report.atlas_error = Some(err);
            }
        }

        let mut slot = 0;
        for (id, light) in lights.directional_lights_mut() {
            let light_space = light.light_space;
            if let Err(err) = self.render_directional(device, config, &mut light.shadow, light_space, casters, slot) {
                report.failures.push((id, err));
            }
            slot += 1;
        }
        for (id, light) in lights.spot_lights_mut() {
            let light_space = light.light_space;
            if let Err(err) = self.render_spot(device, config, &mut light.shadow, light_space, casters, slot) {
                report.failures.push((id, err));
            }
            slot += 1;
        }
        for (id, light) in lights.point_lights_mut() {
            let view = light.cube_view();
            if let Err(err) = self.render_point(device, config, &mut light.shadow, &view, casters) {
                report.failures.push((id, err));
            }
        }

        report.stats = self.stats;
        report
    }

    fn record(&mut self, label: &str, result: &ShadowResult<()>) {
        match result {
            Ok(()) => self.stats.lights_rendered += 1,
            Err(err) => {
                self.stats.lights_failed += 1;
                log::warn!("Rendering '{}' without shadow: {}", label, err);
            }
        }
    }

    fn render_planar(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut LightShadowMap,
        light_space: Mat4,
        casters: &[&dyn ShadowCaster],
        atlas_slot: usize,
    ) -> ShadowResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let result = match config.atlas_mode {
            AtlasMode::Individual => self
                .render_individual(device, config, shadow, light_space, casters)
                .map(|()| None),
            AtlasMode::Atlas => self
                .render_to_atlas(device, config, light_space, casters, atlas_slot)
                .map(|rect| Some((rect, self.atlas_generation))),
        };
        let result = match result {
            Ok(tile) => {
                shadow.mark_rendered(config, tile);
                Ok(())
            }
            Err(err) => {
                shadow.mark_failed();
                Err(err)
            }
        };
        self.record(shadow.label(), &result);
        result
    }

    fn render_individual(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut LightShadowMap,
        light_space: Mat4,
        casters: &[&dyn ShadowCaster],
    ) -> ShadowResult<()> {
        let (target, resolution, program, clear) = if config.is_rsm() {
            shadow.init_rsm(device)?;
            let Some(rsm) = shadow.rsm() else { return Ok(()) };
            (rsm.target, rsm.resolution, self.programs.rsm, ClearFlags::COLOR | ClearFlags::DEPTH)
        } else {
            shadow.init_standard_map(device)?;
            let Some(standard) = shadow.standard() else { return Ok(()) };
            (standard.target, standard.resolution, self.programs.standard, ClearFlags::DEPTH)
        };

        device.bind_render_target(Some(target));
        if config.is_rsm() {
            device.set_draw_buffers(&RSM_DRAW_BUFFERS);
        }
        device.set_viewport(PixelRect::full(resolution, resolution));
        device.clear(clear);
        self.draw_casters(device, program, light_space, None, casters);
        device.bind_render_target(None);
        Ok(())
    }

    fn render_to_atlas(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        light_space: Mat4,
        casters: &[&dyn ShadowCaster],
        atlas_slot: usize,
    ) -> ShadowResult<AtlasRect> {
        let atlas = self.atlas.ok_or(ShadowError::AtlasNotAllocated)?;
        let layout = *atlas.layout();
        let tile = u32::try_from(atlas_slot)
            .ok()
            .and_then(|index| layout.rect(index).zip(layout.pixel_rect(index)));
        let Some((rect, tile)) = tile else {
            return Err(ShadowError::AtlasSlotOutOfRange {
                slot: atlas_slot,
                capacity: layout.capacity() as usize,
            });
        };

        device.bind_render_target(Some(atlas.target()));
        device.set_viewport(tile);
        device.set_scissor(Some(tile));

        let program = if config.is_rsm() {
            device.set_draw_buffers(&RSM_DRAW_BUFFERS);
            device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
            self.programs.rsm
        } else {
            device.set_draw_buffers(&[]);
            device.clear(ClearFlags::DEPTH);
            self.programs.atlas
        };
        self.draw_casters(device, program, light_space, None, casters);

        device.set_scissor(None);
        device.set_viewport(atlas.full_rect());
        device.bind_render_target(None);
        self.stats.atlas_tiles_used += 1;
        Ok(rect)
    }

    fn render_cube(
        &mut self,
        device: &mut dyn RenderDevice,
        config: RenderConfig,
        shadow: &mut PointShadowMap,
        view: &CubeShadowView,
        casters: &[&dyn ShadowCaster],
    ) -> ShadowResult<()> {
        let (target, resolution, program, clear) = if config.is_rsm() {
            shadow.init_rsm(device)?;
            let Some(rsm) = shadow.rsm() else { return Ok(()) };
            (rsm.target, rsm.resolution, self.programs.rsm, ClearFlags::COLOR | ClearFlags::DEPTH)
        } else {
            shadow.init_standard_map(device)?;
            let Some(standard) = shadow.standard() else { return Ok(()) };
            (standard.target, standard.resolution, self.programs.standard, ClearFlags::DEPTH)
        };
        let pass = PointPass {
            position: view.position,
            far_plane: view.far_plane,
        };

        device.bind_render_target(Some(target));
        if config.is_rsm() {
            device.set_draw_buffers(&RSM_DRAW_BUFFERS);
        }
        device.set_viewport(PixelRect::full(resolution, resolution));

        for face in CubeFace::ALL {
            if config.is_rsm() {
                shadow.bind_rsm_face(device, face)?;
            } else {
                shadow.bind_shadow_face(device, face)?;
            }
            device.clear(clear);
            self.draw_casters(device, program, view.face_matrix(face), Some(pass), casters);
            self.stats.faces_rendered += 1;
        }

        device.bind_render_target(None);
        shadow.mark_rendered(config);
        Ok(())
    }

    fn draw_casters(
        &mut self,
        device: &mut dyn RenderDevice,
        program: ProgramHandle,
        light_space: Mat4,
        point: Option<PointPass>,
        casters: &[&dyn ShadowCaster],
    ) {
        device.use_program(program);
        device.set_uniform(program, "lightSpaceMatrix", UniformValue::Mat4(light_space));
        match point {
            Some(pass) => {
                device.set_uniform(program, "lightPos", UniformValue::Vec3(pass.position));
                device.set_uniform(program, "farPlane", UniformValue::Float(pass.far_plane));
            }
            None => device.set_uniform(program, "farPlane", UniformValue::Float(0.0)),
        }

        let frustum = self.cull_casters.then(|| Frustum::from_matrix(&light_space));
        for caster in casters {
            if let (Some(frustum), Some((min, max))) = (&frustum, caster.world_bounds()) {
                if !frustum.is_aabb_inside(min, max) {
                    self.stats.casters_culled += 1;
                    continue;
                }
            }
            device.set_uniform(program, "model", UniformValue::Mat4(caster.model_matrix()));
            caster.render(device);
            self.stats.casters_drawn += 1;
        }
    }

    // Lighting pass

    /// Sampling data for a directional or spot light's last render
    ///
    /// Disabled when the last render failed or its atlas tile belongs to an
    /// atlas that has since been recreated or released.
    pub fn shadow_info(&self, shadow: &LightShadowMap, light_space: Mat4) -> GpuShadowInfo {
        if !shadow.is_rendered() {
            return GpuShadowInfo::disabled();
        }
        let mode = if shadow.use_rsm() { ShadowMode::Rsm } else { ShadowMode::Standard };

        if let Some(rect) = shadow.atlas_rect() {
            return match &self.atlas {
                Some(atlas) if shadow.atlas_generation() == Some(self.atlas_generation) => {
                    GpuShadowInfo::new(light_space, mode, Some(rect), atlas.layout().tile_resolution)
                }
                _ => GpuShadowInfo::disabled(),
            };
        }

        let resolution = match mode {
            ShadowMode::Rsm => shadow.rsm().map(|group| group.resolution),
            ShadowMode::Standard => shadow.standard().map(|group| group.resolution),
        };
        match resolution {
            Some(resolution) => GpuShadowInfo::new(light_space, mode, None, resolution),
            None => GpuShadowInfo::disabled(),
        }
    }

    pub fn rsm_uniforms(&self) -> GpuRsmParams {
        GpuRsmParams::from(self.rsm)
    }

    /// Upload the RSM parameters to a lighting program
    pub fn apply_rsm_uniforms(&self, device: &mut dyn RenderDevice, program: ProgramHandle) {
        device.set_uniform(program, "rsmSmoothness", UniformValue::Float(self.rsm.smoothness));
        device.set_uniform(program, "rsmBias", UniformValue::Float(self.rsm.bias));
        device.set_uniform(program, "rsmRadius", UniformValue::Float(self.rsm.radius));
        device.set_uniform(program, "rsmIntensity", UniformValue::Float(self.rsm.intensity));
    }

    pub fn programs(&self) -> &ShadowPrograms {
        &self.programs
    }

    /// Counters from the most recent render calls
    pub fn stats(&self) -> ShadowStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ShadowStats::default();
    }

    /// Destroy the atlas; programs stay owned by the caller
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(atlas) = self.atlas.take() {
            atlas.destroy(device);
            self.atlas_generation = self.atlas_generation.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caster::MeshCaster;
    use crate::device::DeviceLimits;
    use crate::headless::{Command, HeadlessDevice};
    use crate::resource::MeshId;
    use crate::shadow::config::ShadowQuality;

    fn setup() -> (HeadlessDevice, ShadowManager) {
        let mut device = HeadlessDevice::new();
        let programs = ShadowPrograms::compile(&mut device).unwrap();
        let manager = ShadowManager::new(&ShadowConfig::default(), programs);
        (device, manager)
    }

    #[test]
    fn test_programs_compile() {
        let mut device = HeadlessDevice::new();
        let programs = ShadowPrograms::compile(&mut device).unwrap();
        assert_eq!(device.live_programs(), 3);
        assert_eq!(device.program_label(programs.atlas), Some("shadow atlas depth"));

        programs.release(&mut device);
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_mode_changes_do_no_gpu_work() {
        let (mut device, mut manager) = setup();
        device.clear_commands();
        let textures = device.live_textures();

        manager.set_shadow_mode(ShadowMode::Rsm);
        manager.set_atlas_mode(AtlasMode::Atlas);

        assert_eq!(manager.render_config(), RenderConfig::new(ShadowMode::Rsm, AtlasMode::Atlas));
        assert!(device.commands().is_empty());
        assert_eq!(device.live_textures(), textures);
    }

    #[test]
    fn test_apply_config_switches_modes_without_gpu_work() {
        let (mut device, mut manager) = setup();
        device.clear_commands();

        manager.apply_config(&ShadowQuality::Low.to_config());
        assert_eq!(manager.render_config(), RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas));
        assert_eq!(manager.atlas_tile_resolution(), 512);
        assert!(device.commands().is_empty());

        manager.apply_config(&ShadowQuality::Off.to_config());
        assert!(!manager.is_enabled());
    }

    #[test]
    fn test_rsm_param_accessors() {
        let (_, mut manager) = setup();
        assert_eq!(manager.rsm_params(), RsmParams::default());

        manager.set_rsm_radius(0.3);
        manager.set_rsm_intensity(2.0);
        assert_eq!(manager.rsm_radius(), 0.3);
        assert_eq!(manager.rsm_intensity(), 2.0);
        assert_eq!(manager.rsm_uniforms().radius, 0.3);
    }

    #[test]
    fn test_atlas_allocation_is_cached() {
        let (mut device, mut manager) = setup();
        manager.allocate_atlas_space(&mut device, 5, 1024).unwrap();
        let first = *manager.atlas().unwrap();

        manager.allocate_atlas_space(&mut device, 5, 1024).unwrap();
        assert_eq!(*manager.atlas().unwrap(), first);
        assert_eq!(device.live_textures(), 3);

        manager.allocate_atlas_space(&mut device, 2, 1024).unwrap();
        assert_ne!(manager.atlas().unwrap().target(), first.target());
        assert_eq!(manager.atlas_layout().unwrap().atlas_size(), (2048, 1024));
        assert_eq!(device.live_textures(), 3);
    }

    #[test]
    fn test_atlas_render_without_allocation() {
        let (mut device, mut manager) = setup();
        let mut shadow = LightShadowMap::new("sun", 1024);
        let config = RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas);

        let err = manager
            .render_directional(&mut device, config, &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap_err();
        assert!(matches!(err, ShadowError::AtlasNotAllocated));
        assert_eq!(manager.stats().lights_failed, 1);
    }

    #[test]
    fn test_atlas_slot_out_of_range() {
        let (mut device, mut manager) = setup();
        manager.allocate_atlas_space(&mut device, 2, 512).unwrap();
        let mut shadow = LightShadowMap::new("spot", 512);
        let config = RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas);

        let err = manager
            .render_spot(&mut device, config, &mut shadow, Mat4::IDENTITY, &[], 2)
            .unwrap_err();
        assert!(matches!(err, ShadowError::AtlasSlotOutOfRange { slot: 2, capacity: 2 }));
        assert!(shadow.atlas_rect().is_none());
    }

    #[test]
    fn test_culling_skips_casters_outside_light() {
        let (mut device, mut manager) = setup();
        let mut shadow = LightShadowMap::new("spot", 256);
        let light_space = Mat4::orthographic_rh_gl(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0);

        let inside = MeshCaster::new(MeshId(1), 3).with_bounds(Vec3::splat(-0.5), Vec3::splat(0.5));
        let outside = MeshCaster::new(MeshId(2), 3)
            .with_bounds(Vec3::splat(-0.5), Vec3::splat(0.5))
            .with_transform(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let unbounded = MeshCaster::new(MeshId(3), 3).with_transform(Mat4::from_translation(Vec3::splat(10.0)));

        manager
            .render_spot(&mut device, RenderConfig::default(), &mut shadow, light_space, &[&inside, &outside, &unbounded], 0)
            .unwrap();

        assert_eq!(manager.stats().casters_drawn, 2);
        assert_eq!(manager.stats().casters_culled, 1);
        assert_eq!(device.draw_count(), 2);
    }

    #[test]
    fn test_disabled_manager_renders_nothing() {
        let mut device = HeadlessDevice::new();
        let programs = ShadowPrograms::compile(&mut device).unwrap();
        let mut manager = ShadowManager::new(&ShadowConfig::disabled(), programs);
        let mut shadow = LightShadowMap::new("sun", 1024);

        manager
            .render_directional(&mut device, RenderConfig::default(), &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap();
        assert!(!shadow.has_standard());
        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn test_shadow_info_follows_last_render() {
        let (mut device, mut manager) = setup();
        let mut shadow = LightShadowMap::new("sun", 1024);
        assert!(!manager.shadow_info(&shadow, Mat4::IDENTITY).is_enabled());

        manager
            .render_directional(&mut device, RenderConfig::default(), &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap();
        let info = manager.shadow_info(&shadow, Mat4::IDENTITY);
        assert!(info.is_enabled());
        assert_eq!(info.in_atlas, 0);
        assert_eq!(info.texel_size, 1.0 / 1024.0);

        manager.allocate_atlas_space(&mut device, 4, 512).unwrap();
        let atlas = RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas);
        manager
            .render_directional(&mut device, atlas, &mut shadow, Mat4::IDENTITY, &[], 3)
            .unwrap();
        let info = manager.shadow_info(&shadow, Mat4::IDENTITY);
        assert_eq!(info.in_atlas, 1);
        assert_eq!(info.atlas_rect, [0.5, 0.5, 0.5, 0.5]);
        assert_eq!(info.texel_size, 1.0 / 512.0);
    }

    fn limited_setup(max_texture_size: u32) -> (HeadlessDevice, ShadowManager) {
        let mut device = HeadlessDevice::with_limits(DeviceLimits {
            max_texture_size,
            ..Default::default()
        });
        let programs = ShadowPrograms::compile(&mut device).unwrap();
        let manager = ShadowManager::new(&ShadowConfig::default(), programs);
        (device, manager)
    }

    #[test]
    fn test_failed_render_leaves_atlas_tile() {
        let (mut device, mut manager) = limited_setup(1024);
        manager.allocate_atlas_space(&mut device, 1, 1024).unwrap();
        let mut shadow = LightShadowMap::new("sun", 4096);

        let atlas = RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas);
        manager
            .render_directional(&mut device, atlas, &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap();
        assert!(manager.shadow_info(&shadow, Mat4::IDENTITY).is_enabled());

        // The light's own 4096 target does not fit the device
        let err = manager
            .render_directional(&mut device, RenderConfig::default(), &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap_err();
        assert!(matches!(err, ShadowError::IncompleteTarget { .. }));
        assert!(shadow.atlas_rect().is_none());
        assert!(!shadow.use_atlas());

        let info = manager.shadow_info(&shadow, Mat4::IDENTITY);
        assert!(!info.is_enabled());
        assert_eq!(info.in_atlas, 0);
    }

    #[test]
    fn test_failed_standard_render_after_rsm_frame() {
        let (mut device, mut manager) = limited_setup(1024);
        let mut shadow = LightShadowMap::new("spot", 1024);

        let rsm = RenderConfig::new(ShadowMode::Rsm, AtlasMode::Individual);
        manager
            .render_spot(&mut device, rsm, &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap();
        assert!(shadow.use_rsm());

        // Only records the resolution; the standard group does not exist yet
        shadow.resize_shadow(&mut device, 4096).unwrap();
        manager
            .render_spot(&mut device, RenderConfig::default(), &mut shadow, Mat4::IDENTITY, &[], 0)
            .unwrap_err();

        assert!(!shadow.use_rsm());
        assert!(!shadow.is_rendered());
        assert!(shadow.has_rsm());
        assert!(!manager.shadow_info(&shadow, Mat4::IDENTITY).is_enabled());
    }

    #[test]
    fn test_atlas_reallocation_invalidates_tiles() {
        let (mut device, mut manager) = setup();
        manager.allocate_atlas_space(&mut device, 5, 1024).unwrap();
        let mut shadow = LightShadowMap::new("sun", 1024);
        let atlas = RenderConfig::new(ShadowMode::Standard, AtlasMode::Atlas);

        manager
            .render_directional(&mut device, atlas, &mut shadow, Mat4::IDENTITY, &[], 4)
            .unwrap();
        assert_eq!(manager.shadow_info(&shadow, Mat4::IDENTITY).in_atlas, 1);
        assert_eq!(shadow.atlas_generation(), Some(manager.atlas_generation()));

        manager.allocate_atlas_space(&mut device, 2, 512).unwrap();
        let info = manager.shadow_info(&shadow, Mat4::IDENTITY);
        assert!(!info.is_enabled());
        assert_eq!(info.in_atlas, 0);

        // Same layout as before, but the tile contents are gone
        manager.allocate_atlas_space(&mut device, 5, 1024).unwrap();
        assert!(!manager.shadow_info(&shadow, Mat4::IDENTITY).is_enabled());

        manager
            .render_directional(&mut device, atlas, &mut shadow, Mat4::IDENTITY, &[], 1)
            .unwrap();
        let info = manager.shadow_info(&shadow, Mat4::IDENTITY);
        assert!(info.is_enabled());
        assert_eq!(info.in_atlas, 1);

        manager.release(&mut device);
        assert!(!manager.shadow_info(&shadow, Mat4::IDENTITY).is_enabled());
    }

    #[test]
    fn test_failed_point_render_has_no_shadow() {
        let (mut device, mut manager) = limited_setup(1024);
        let view = CubeShadowView::from_position(Vec3::ZERO, 0.1, 20.0);
        let rsm = RenderConfig::new(ShadowMode::Rsm, AtlasMode::Individual);

        let mut fits = PointShadowMap::new("lamp", 512);
        manager.render_point(&mut device, rsm, &mut fits, &view, &[]).unwrap();
        assert!(fits.is_rendered());
        assert!(fits.use_rsm());

        let mut too_large = PointShadowMap::new("flood", 2048);
        manager
            .render_point(&mut device, rsm, &mut too_large, &view, &[])
            .unwrap_err();
        assert!(!too_large.is_rendered());
        assert!(!too_large.use_rsm());
        assert_eq!(manager.stats().lights_failed, 1);
    }

    #[test]
    fn test_apply_rsm_uniforms() {
        let (mut device, manager) = setup();
        let lighting = device
            .compile_program(&ProgramSource::new("lighting", "void main() {}", "void main() {}"))
            .unwrap();

        manager.apply_rsm_uniforms(&mut device, lighting);
        assert_eq!(device.uniform(lighting, "rsmBias"), Some(UniformValue::Float(0.05)));
        assert_eq!(device.uniform(lighting, "rsmSmoothness"), Some(UniformValue::Float(0.5)));
    }

    #[test]
    fn test_point_pass_uniforms() {
        let (mut device, mut manager) = setup();
        let mut shadow = PointShadowMap::new("lamp", 256);
        let view = CubeShadowView::from_position(Vec3::new(0.0, 3.0, 0.0), 0.1, 30.0);
        let caster = MeshCaster::new(MeshId(1), 36);

        manager
            .render_point(&mut device, RenderConfig::default(), &mut shadow, &view, &[&caster])
            .unwrap();

        let standard = manager.programs().standard;
        assert_eq!(device.uniform(standard, "farPlane"), Some(UniformValue::Float(30.0)));
        assert_eq!(device.uniform(standard, "lightPos"), Some(UniformValue::Vec3(Vec3::new(0.0, 3.0, 0.0))));
        assert_eq!(
            device.uniform(standard, "lightSpaceMatrix"),
            Some(UniformValue::Mat4(view.face_matrix(CubeFace::NegativeZ)))
        );
        assert_eq!(manager.stats().faces_rendered, 6);
        assert!(device
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Attach { .. })));
    }
}
