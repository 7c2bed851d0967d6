//! Shadow render target groups
//!
//! A group is the set of textures, samplers and render target one shadow
//! algorithm needs. Groups are built all-or-nothing: if any step fails,
//! everything created so far is destroyed before the error is returned.

use crate::device::RenderDevice;
use crate::resource::{
    AttachmentSlot, AttachmentView, CubeFace, RenderTargetDesc, RenderTargetHandle, SamplerDesc,
    SamplerHandle, TextureDesc, TextureDimension, TextureFormat, TextureHandle,
};

use super::error::{ShadowError, ShadowResult};

/// Depth format of every shadow depth target
pub const SHADOW_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
/// Format of the RSM normal and flux buffers
pub const RSM_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Draw buffers of an RSM pass: normal and flux written together
pub const RSM_DRAW_BUFFERS: [AttachmentSlot; 2] = [AttachmentSlot::Color(0), AttachmentSlot::Color(1)];

/// Tracks resources created for one group so a failed build can be undone
pub(crate) struct GroupBuilder {
    label: String,
    textures: Vec<TextureHandle>,
    samplers: Vec<SamplerHandle>,
    targets: Vec<RenderTargetHandle>,
}

impl GroupBuilder {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            textures: Vec::new(),
            samplers: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn texture(
        &mut self,
        device: &mut dyn RenderDevice,
        desc: &TextureDesc,
    ) -> ShadowResult<TextureHandle> {
        let texture = device.create_texture(desc)?;
        self.textures.push(texture);
        Ok(texture)
    }

    pub fn sampler(
        &mut self,
        device: &mut dyn RenderDevice,
        desc: &SamplerDesc,
    ) -> ShadowResult<SamplerHandle> {
        let sampler = device.create_sampler(desc)?;
        self.samplers.push(sampler);
        Ok(sampler)
    }

    /// Create a render target and check it is complete
    pub fn target(
        &mut self,
        device: &mut dyn RenderDevice,
        desc: &RenderTargetDesc,
    ) -> ShadowResult<RenderTargetHandle> {
        let target = device.create_render_target(desc)?;
        self.targets.push(target);

        let status = device.target_status(target);
        if !status.is_complete() {
            return Err(ShadowError::IncompleteTarget {
                label: self.label.clone(),
                status,
            });
        }
        Ok(target)
    }

    fn discard(self, device: &mut dyn RenderDevice) {
        for target in self.targets {
            device.destroy_render_target(target);
        }
        for sampler in self.samplers {
            device.destroy_sampler(sampler);
        }
        for texture in self.textures {
            device.destroy_texture(texture);
        }
    }
}

/// Run `build`, tearing down its partial resources if it fails
pub(crate) fn build_group<T>(
    device: &mut dyn RenderDevice,
    label: &str,
    build: impl FnOnce(&mut dyn RenderDevice, &mut GroupBuilder) -> ShadowResult<T>,
) -> ShadowResult<T> {
    let mut group = GroupBuilder::new(label);
    match build(&mut *device, &mut group) {
        Ok(value) => {
            log::debug!("Created shadow target group '{}'", label);
            Ok(value)
        }
        Err(err) => {
            log::error!("Failed to create shadow target group '{}': {}", label, err);
            group.discard(device);
            Err(err)
        }
    }
}

/// Cube targets start out attached to the first face
fn initial_view(texture: TextureHandle, dimension: TextureDimension) -> AttachmentView {
    match dimension {
        TextureDimension::D2 => AttachmentView::whole(texture),
        TextureDimension::Cube => AttachmentView::face(texture, CubeFace::PositiveX),
    }
}

/// Depth-only shadow target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardTargets {
    pub target: RenderTargetHandle,
    /// 2D depth texture, or a depth cube for point lights
    pub depth: TextureHandle,
    /// Comparison sampler for hardware PCF
    pub sampler: SamplerHandle,
    pub resolution: u32,
    pub dimension: TextureDimension,
}

impl StandardTargets {
    pub fn create(
        device: &mut dyn RenderDevice,
        label: &str,
        resolution: u32,
        dimension: TextureDimension,
    ) -> ShadowResult<Self> {
        build_group(device, label, |device, group| {
            let depth = group.texture(
                device,
                &TextureDesc::attachment(format!("{label} depth"), resolution, dimension, SHADOW_DEPTH_FORMAT),
            )?;
            let sampler = group.sampler(device, &SamplerDesc::shadow_comparison(format!("{label} sampler")))?;
            let target = group.target(
                device,
                &RenderTargetDesc {
                    label: label.to_owned(),
                    attachments: vec![(AttachmentSlot::Depth, initial_view(depth, dimension))],
                    draw_buffers: Vec::new(),
                },
            )?;

            Ok(Self {
                target,
                depth,
                sampler,
                resolution,
                dimension,
            })
        })
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_render_target(self.target);
        device.destroy_sampler(self.sampler);
        device.destroy_texture(self.depth);
    }
}

/// Reflective shadow map targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RsmTargets {
    pub target: RenderTargetHandle,
    /// World-space normals, attachment `Color(0)`
    pub normal: TextureHandle,
    /// Reflected flux, attachment `Color(1)`
    pub color: TextureHandle,
    pub depth: TextureHandle,
    /// False when `depth` belongs to the standard group (point lights)
    pub owns_depth: bool,
    pub resolution: u32,
    pub dimension: TextureDimension,
}

impl RsmTargets {
    /// Planar RSM with its own depth buffer
    pub fn create(device: &mut dyn RenderDevice, label: &str, resolution: u32) -> ShadowResult<Self> {
        Self::build(device, label, resolution, TextureDimension::D2, None)
    }

    /// Cube RSM rendering into an existing depth cube
    pub fn create_cube(
        device: &mut dyn RenderDevice,
        label: &str,
        resolution: u32,
        shared_depth: TextureHandle,
    ) -> ShadowResult<Self> {
        Self::build(device, label, resolution, TextureDimension::Cube, Some(shared_depth))
    }

    fn build(
        device: &mut dyn RenderDevice,
        label: &str,
        resolution: u32,
        dimension: TextureDimension,
        shared_depth: Option<TextureHandle>,
    ) -> ShadowResult<Self> {
        build_group(device, label, |device, group| {
            let normal = group.texture(
                device,
                &TextureDesc::attachment(format!("{label} normal"), resolution, dimension, RSM_COLOR_FORMAT),
            )?;
            let color = group.texture(
                device,
                &TextureDesc::attachment(format!("{label} flux"), resolution, dimension, RSM_COLOR_FORMAT),
            )?;
            let depth = match shared_depth {
                Some(depth) => depth,
                None => group.texture(
                    device,
                    &TextureDesc::attachment(format!("{label} depth"), resolution, dimension, SHADOW_DEPTH_FORMAT),
                )?,
            };

            let target = group.target(
                device,
                &RenderTargetDesc {
                    label: label.to_owned(),
                    attachments: vec![
                        (AttachmentSlot::Color(0), initial_view(normal, dimension)),
                        (AttachmentSlot::Color(1), initial_view(color, dimension)),
                        (AttachmentSlot::Depth, initial_view(depth, dimension)),
                    ],
                    draw_buffers: RSM_DRAW_BUFFERS.to_vec(),
                },
            )?;

            Ok(Self {
                target,
                normal,
                color,
                depth,
                owns_depth: shared_depth.is_none(),
                resolution,
                dimension,
            })
        })
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_render_target(self.target);
        device.destroy_texture(self.normal);
        device.destroy_texture(self.color);
        if self.owns_depth {
            device.destroy_texture(self.depth);
        }
    }

    /// Point the attachments at one cube face
    pub fn bind_face(&self, device: &mut dyn RenderDevice, face: CubeFace) -> ShadowResult<()> {
        device.attach(self.target, AttachmentSlot::Color(0), AttachmentView::face(self.normal, face))?;
        device.attach(self.target, AttachmentSlot::Color(1), AttachmentView::face(self.color, face))?;
        device.attach(self.target, AttachmentSlot::Depth, AttachmentView::face(self.depth, face))?;
        Ok(())
    }
}

impl StandardTargets {
    /// Point the depth attachment at one cube face
    pub fn bind_face(&self, device: &mut dyn RenderDevice, face: CubeFace) -> ShadowResult<()> {
        device.attach(self.target, AttachmentSlot::Depth, AttachmentView::face(self.depth, face))?;
        Ok(())
    }
}
