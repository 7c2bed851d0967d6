//! Per-light shadow resources
//!
//! Each shadow-casting light owns up to two target groups: a depth-only
//! "standard" group and a reflective shadow map group. Both are created
//! lazily and are either absent or complete.

use crate::device::RenderDevice;
use crate::resource::{CubeFace, TextureDimension};

use super::atlas::AtlasRect;
use super::config::RenderConfig;
use super::error::ShadowResult;
use super::targets::{RsmTargets, StandardTargets};

/// Lifecycle shared by planar and cube shadow resources
pub trait ShadowResource {
    /// Debug label used for the created targets
    fn label(&self) -> &str;

    /// Resolution of the standard shadow map
    fn resolution(&self) -> u32;

    fn standard(&self) -> Option<&StandardTargets>;

    fn rsm(&self) -> Option<&RsmTargets>;

    fn has_standard(&self) -> bool {
        self.standard().is_some()
    }

    fn has_rsm(&self) -> bool {
        self.rsm().is_some()
    }

    /// Create the depth-only group; no-op if it exists
    fn init_standard_map(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()>;

    /// Create the RSM group; no-op if it exists
    fn init_rsm(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()>;

    /// Recreate the standard group at a new resolution
    fn resize_shadow(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()>;

    /// Recreate the RSM group at a new resolution
    fn resize_rsm(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()>;

    /// Release the RSM group; safe when absent
    fn destroy_rsm(&mut self, device: &mut dyn RenderDevice);

    /// Release every group
    fn release(&mut self, device: &mut dyn RenderDevice);
}

/// Shadow map for directional and spot lights
#[derive(Clone, Debug, PartialEq)]
pub struct LightShadowMap {
    label: String,
    resolution: u32,
    rsm_resolution: u32,
    standard: Option<StandardTargets>,
    rsm: Option<RsmTargets>,
    rendered: bool,
    use_rsm: bool,
    /// Tile and the generation of the atlas it was taken from
    atlas_tile: Option<(AtlasRect, u32)>,
}

impl LightShadowMap {
    pub fn new(label: impl Into<String>, resolution: u32) -> Self {
        Self {
            label: label.into(),
            resolution,
            rsm_resolution: resolution,
            standard: None,
            rsm: None,
            rendered: false,
            use_rsm: false,
            atlas_tile: None,
        }
    }

    pub fn rsm_resolution(&self) -> u32 {
        self.rsm_resolution
    }

    /// Whether the last render produced a shadow
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    /// Whether the last render used the RSM path
    pub fn use_rsm(&self) -> bool {
        self.use_rsm
    }

    /// Whether the last render went to the shared atlas
    pub fn use_atlas(&self) -> bool {
        self.atlas_tile.is_some()
    }

    /// Tile of the shared atlas this light occupies
    pub fn atlas_rect(&self) -> Option<AtlasRect> {
        self.atlas_tile.map(|(rect, _)| rect)
    }

    /// Generation of the atlas the tile belongs to
    pub fn atlas_generation(&self) -> Option<u32> {
        self.atlas_tile.map(|(_, generation)| generation)
    }

    /// Record which path the last render took
    pub(crate) fn mark_rendered(&mut self, config: RenderConfig, atlas_tile: Option<(AtlasRect, u32)>) {
        self.rendered = true;
        self.use_rsm = config.is_rsm();
        self.atlas_tile = atlas_tile;
    }

    /// Forget the last render; the light samples no shadow until it renders again
    pub(crate) fn mark_failed(&mut self) {
        self.rendered = false;
        self.use_rsm = false;
        self.atlas_tile = None;
    }
}

impl ShadowResource for LightShadowMap {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> u32 {
        self.resolution
    }

    fn standard(&self) -> Option<&StandardTargets> {
        self.standard.as_ref()
    }

    fn rsm(&self) -> Option<&RsmTargets> {
        self.rsm.as_ref()
    }

    fn init_standard_map(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()> {
        if self.standard.is_some() {
            return Ok(());
        }
        let label = format!("{} shadow", self.label);
        self.standard = Some(StandardTargets::create(device, &label, self.resolution, TextureDimension::D2)?);
        Ok(())
    }

    fn init_rsm(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()> {
        if self.rsm.is_some() {
            return Ok(());
        }
        let label = format!("{} rsm", self.label);
        self.rsm = Some(RsmTargets::create(device, &label, self.rsm_resolution)?);
        Ok(())
    }

    fn resize_shadow(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()> {
        if resolution == self.resolution {
            return Ok(());
        }
        log::debug!("Resizing '{}' shadow map {} -> {}", self.label, self.resolution, resolution);
        self.resolution = resolution;
        match self.standard.take() {
            Some(group) => {
                group.destroy(device);
                self.init_standard_map(device)
            }
            None => Ok(()),
        }
    }

    fn resize_rsm(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()> {
        if resolution == self.rsm_resolution {
            return Ok(());
        }
        log::debug!("Resizing '{}' RSM {} -> {}", self.label, self.rsm_resolution, resolution);
        self.rsm_resolution = resolution;
        match self.rsm.take() {
            Some(group) => {
                group.destroy(device);
                self.init_rsm(device)
            }
            None => Ok(()),
        }
    }

    fn destroy_rsm(&mut self, device: &mut dyn RenderDevice) {
        if let Some(group) = self.rsm.take() {
            group.destroy(device);
        }
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        self.destroy_rsm(device);
        if let Some(group) = self.standard.take() {
            group.destroy(device);
        }
        self.mark_failed();
    }
}

/// Omnidirectional shadow map for point lights
///
/// The RSM group renders into the standard group's depth cube, so both
/// groups always share one resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct PointShadowMap {
    label: String,
    resolution: u32,
    standard: Option<StandardTargets>,
    rsm: Option<RsmTargets>,
    rendered: bool,
    use_rsm: bool,
}

impl PointShadowMap {
    pub fn new(label: impl Into<String>, resolution: u32) -> Self {
        Self {
            label: label.into(),
            resolution,
            standard: None,
            rsm: None,
            rendered: false,
            use_rsm: false,
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn use_rsm(&self) -> bool {
        self.use_rsm
    }

    pub(crate) fn mark_rendered(&mut self, config: RenderConfig) {
        self.rendered = true;
        self.use_rsm = config.is_rsm();
    }

    pub(crate) fn mark_failed(&mut self) {
        self.rendered = false;
        self.use_rsm = false;
    }

    /// Attach one face of the standard depth cube
    pub fn bind_shadow_face(&self, device: &mut dyn RenderDevice, face: CubeFace) -> ShadowResult<()> {
        match &self.standard {
            Some(group) => group.bind_face(device, face),
            None => Ok(()),
        }
    }

    /// Attach one face of the RSM cubes and the shared depth cube
    pub fn bind_rsm_face(&self, device: &mut dyn RenderDevice, face: CubeFace) -> ShadowResult<()> {
        match &self.rsm {
            Some(group) => group.bind_face(device, face),
            None => Ok(()),
        }
    }

    fn resize(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()> {
        if resolution == self.resolution {
            return Ok(());
        }
        log::debug!("Resizing '{}' cube shadow {} -> {}", self.label, self.resolution, resolution);

        let had_standard = self.standard.is_some();
        let had_rsm = self.rsm.is_some();
        self.release(device);
        self.resolution = resolution;

        if had_standard {
            self.init_standard_map(device)?;
        }
        if had_rsm {
            self.init_rsm(device)?;
        }
        Ok(())
    }
}

impl ShadowResource for PointShadowMap {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> u32 {
        self.resolution
    }

    fn standard(&self) -> Option<&StandardTargets> {
        self.standard.as_ref()
    }

    fn rsm(&self) -> Option<&RsmTargets> {
        self.rsm.as_ref()
    }

    fn init_standard_map(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()> {
        if self.standard.is_some() {
            return Ok(());
        }
        let label = format!("{} cube shadow", self.label);
        self.standard = Some(StandardTargets::create(device, &label, self.resolution, TextureDimension::Cube)?);
        Ok(())
    }

    fn init_rsm(&mut self, device: &mut dyn RenderDevice) -> ShadowResult<()> {
        if self.rsm.is_some() {
            return Ok(());
        }
        self.init_standard_map(device)?;
        let Some(depth) = self.standard.as_ref().map(|group| group.depth) else {
            return Ok(());
        };
        let label = format!("{} cube rsm", self.label);
        self.rsm = Some(RsmTargets::create_cube(device, &label, self.resolution, depth)?);
        Ok(())
    }

    fn resize_shadow(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()> {
        self.resize(device, resolution)
    }

    fn resize_rsm(&mut self, device: &mut dyn RenderDevice, resolution: u32) -> ShadowResult<()> {
        self.resize(device, resolution)
    }

    fn destroy_rsm(&mut self, device: &mut dyn RenderDevice) {
        if let Some(group) = self.rsm.take() {
            group.destroy(device);
        }
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        // RSM first: it borrows the standard depth cube
        self.destroy_rsm(device);
        if let Some(group) = self.standard.take() {
            group.destroy(device);
        }
        self.mark_failed();
    }
}
