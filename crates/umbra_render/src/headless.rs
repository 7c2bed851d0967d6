//! Headless render device
//!
//! A `RenderDevice` that keeps resource bookkeeping, validates render
//! targets with the same completeness rules a GPU driver applies, and
//! records every pass command instead of executing it. Used by tests and
//! tooling that need to observe what the shadow subsystem asks for.

use std::collections::{BTreeMap, HashMap};

use crate::device::{DeviceError, DeviceLimits, RenderDevice};
use crate::handle::ResourcePool;
use crate::resource::{
    AttachmentSlot, AttachmentView, ClearFlags, DrawCall, PixelRect, Program, ProgramHandle,
    ProgramSource, RenderTarget, RenderTargetDesc, RenderTargetHandle, Sampler, SamplerDesc,
    SamplerHandle, TargetStatus, Texture, TextureDesc, TextureDimension, TextureHandle,
    TextureUsage, UniformValue,
};

/// Size of the default framebuffer
const SURFACE_SIZE: (u32, u32) = (1280, 720);

/// A recorded pass command
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Attach {
        target: RenderTargetHandle,
        slot: AttachmentSlot,
        view: AttachmentView,
    },
    BindRenderTarget(Option<RenderTargetHandle>),
    SetDrawBuffers(Vec<AttachmentSlot>),
    SetViewport(PixelRect),
    SetScissor(Option<PixelRect>),
    Clear {
        target: Option<RenderTargetHandle>,
        flags: ClearFlags,
        /// Pixels actually cleared (scissor rect when enabled)
        region: PixelRect,
    },
    UseProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    Draw {
        target: Option<RenderTargetHandle>,
        program: Option<ProgramHandle>,
        viewport: PixelRect,
        scissor: Option<PixelRect>,
        call: DrawCall,
    },
}

struct TextureRecord {
    desc: TextureDesc,
    /// False when storage allocation failed (e.g. oversized request)
    allocated: bool,
}

struct TargetRecord {
    attachments: BTreeMap<AttachmentSlot, AttachmentView>,
    draw_buffers: Vec<AttachmentSlot>,
}

struct ProgramRecord {
    label: String,
    uniforms: HashMap<String, UniformValue>,
}

/// Recording device without a GPU
pub struct HeadlessDevice {
    limits: DeviceLimits,
    /// Reject oversized textures instead of creating them without storage
    strict_limits: bool,
    textures: ResourcePool<Texture, TextureRecord>,
    samplers: ResourcePool<Sampler, SamplerDesc>,
    targets: ResourcePool<RenderTarget, TargetRecord>,
    programs: ResourcePool<Program, ProgramRecord>,
    bound_target: Option<RenderTargetHandle>,
    bound_program: Option<ProgramHandle>,
    viewport: PixelRect,
    scissor: Option<PixelRect>,
    commands: Vec<Command>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            strict_limits: false,
            textures: ResourcePool::new(),
            samplers: ResourcePool::new(),
            targets: ResourcePool::new(),
            programs: ResourcePool::new(),
            bound_target: None,
            bound_program: None,
            viewport: PixelRect::full(SURFACE_SIZE.0, SURFACE_SIZE.1),
            scissor: None,
            commands: Vec::new(),
        }
    }

    /// Return `TextureTooLarge` for oversized textures
    pub fn with_strict_limits(mut self) -> Self {
        self.strict_limits = true;
        self
    }

    // Inspection

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of draw commands recorded so far
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_samplers(&self) -> usize {
        self.samplers.len()
    }

    pub fn live_render_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(texture).map(|t| &t.desc)
    }

    pub fn sampler_desc(&self, sampler: SamplerHandle) -> Option<&SamplerDesc> {
        self.samplers.get(sampler)
    }

    pub fn attachment(
        &self,
        target: RenderTargetHandle,
        slot: AttachmentSlot,
    ) -> Option<AttachmentView> {
        self.targets
            .get(target)
            .and_then(|t| t.attachments.get(&slot).copied())
    }

    pub fn draw_buffers(&self, target: RenderTargetHandle) -> Option<&[AttachmentSlot]> {
        self.targets.get(target).map(|t| t.draw_buffers.as_slice())
    }

    /// Last value set for a program uniform
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs
            .get(program)
            .and_then(|p| p.uniforms.get(name).copied())
    }

    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(program).map(|p| p.label.as_str())
    }

    pub fn bound_render_target(&self) -> Option<RenderTargetHandle> {
        self.bound_target
    }

    pub fn viewport(&self) -> PixelRect {
        self.viewport
    }

    pub fn scissor(&self) -> Option<PixelRect> {
        self.scissor
    }

    fn target_size(&self, target: Option<RenderTargetHandle>) -> (u32, u32) {
        let size = target
            .and_then(|t| self.targets.get(t))
            .and_then(|t| t.attachments.values().next())
            .and_then(|view| self.textures.get(view.texture))
            .map(|tex| (tex.desc.width, tex.desc.height));
        size.unwrap_or(SURFACE_SIZE)
    }

    fn validate_desc(&self, desc: &TextureDesc) -> Result<(), DeviceError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::InvalidDescriptor {
                label: desc.label.clone(),
                reason: "zero-sized texture".into(),
            });
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(DeviceError::InvalidDescriptor {
                label: desc.label.clone(),
                reason: format!("cube faces must be square, got {}x{}", desc.width, desc.height),
            });
        }
        Ok(())
    }

    fn attachment_status(&self, slot: AttachmentSlot, view: &AttachmentView) -> Result<(u32, u32), TargetStatus> {
        let texture = self
            .textures
            .get(view.texture)
            .ok_or(TargetStatus::MissingAttachment)?;

        if !texture.allocated || !texture.desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return Err(TargetStatus::IncompleteAttachment);
        }
        if let Some(layer) = view.layer {
            if layer >= texture.desc.layers() {
                return Err(TargetStatus::IncompleteAttachment);
            }
        }

        let format_ok = match slot {
            AttachmentSlot::Depth => texture.desc.format.is_depth(),
            AttachmentSlot::Color(index) => {
                !texture.desc.format.is_depth()
                    && u32::from(index) < self.limits.max_color_attachments
            }
        };
        if !format_ok {
            return Err(TargetStatus::UnsupportedFormat);
        }

        Ok((texture.desc.width, texture.desc.height))
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, DeviceError> {
        self.validate_desc(desc)?;

        let max = self.limits.max_texture_size;
        let oversized = desc.width > max || desc.height > max;
        if oversized && self.strict_limits {
            return Err(DeviceError::TextureTooLarge {
                label: desc.label.clone(),
                width: desc.width,
                height: desc.height,
                max,
            });
        }
        if oversized {
            log::warn!(
                "Texture '{}' ({}x{}) exceeds max size {}, storage not allocated",
                desc.label,
                desc.width,
                desc.height,
                max
            );
        }

        Ok(self.textures.insert(TextureRecord {
            desc: desc.clone(),
            allocated: !oversized,
        }))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_none() {
            log::debug!("destroy_texture on stale handle {:?}", texture);
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
        Ok(self.samplers.insert(desc.clone()))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(sampler).is_none() {
            log::debug!("destroy_sampler on stale handle {:?}", sampler);
        }
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDesc,
    ) -> Result<RenderTargetHandle, DeviceError> {
        let mut attachments = BTreeMap::new();
        for (slot, view) in &desc.attachments {
            if attachments.insert(*slot, *view).is_some() {
                return Err(DeviceError::InvalidDescriptor {
                    label: desc.label.clone(),
                    reason: format!("{:?} attached twice", slot),
                });
            }
        }

        Ok(self.targets.insert(TargetRecord {
            attachments,
            draw_buffers: desc.draw_buffers.clone(),
        }))
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if self.targets.remove(target).is_none() {
            log::debug!("destroy_render_target on stale handle {:?}", target);
        }
        if self.bound_target == Some(target) {
            self.bound_target = None;
        }
    }

    fn attach(
        &mut self,
        target: RenderTargetHandle,
        slot: AttachmentSlot,
        view: AttachmentView,
    ) -> Result<(), DeviceError> {
        if !self.textures.contains(view.texture) {
            return Err(DeviceError::InvalidHandle { kind: "texture" });
        }
        let record = self
            .targets
            .get_mut(target)
            .ok_or(DeviceError::InvalidHandle { kind: "render target" })?;
        record.attachments.insert(slot, view);
        self.commands.push(Command::Attach { target, slot, view });
        Ok(())
    }

    fn target_status(&self, target: RenderTargetHandle) -> TargetStatus {
        let Some(record) = self.targets.get(target) else {
            return TargetStatus::MissingAttachment;
        };
        if record.attachments.is_empty() {
            return TargetStatus::MissingAttachment;
        }

        let mut size = None;
        for (slot, view) in &record.attachments {
            let dims = match self.attachment_status(*slot, view) {
                Ok(dims) => dims,
                Err(status) => return status,
            };
            match size {
                None => size = Some(dims),
                Some(existing) if existing != dims => return TargetStatus::MismatchedSize,
                Some(_) => {}
            }
        }

        let draw_buffers_ok = record.draw_buffers.iter().all(|slot| {
            matches!(slot, AttachmentSlot::Color(_)) && record.attachments.contains_key(slot)
        });
        if !draw_buffers_ok {
            return TargetStatus::MissingAttachment;
        }

        TargetStatus::Complete
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, DeviceError> {
        let stage = if source.vertex.trim().is_empty() {
            Some("vertex")
        } else if source.fragment.trim().is_empty() {
            Some("fragment")
        } else {
            None
        };
        if let Some(stage) = stage {
            return Err(DeviceError::ShaderCompile {
                label: source.label.clone(),
                message: format!("empty {} stage", stage),
            });
        }

        Ok(self.programs.insert(ProgramRecord {
            label: source.label.clone(),
            uniforms: HashMap::new(),
        }))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.bound_target = target;
        self.commands.push(Command::BindRenderTarget(target));
    }

    fn set_draw_buffers(&mut self, buffers: &[AttachmentSlot]) {
        if let Some(record) = self.bound_target.and_then(|t| self.targets.get_mut(t)) {
            record.draw_buffers = buffers.to_vec();
        }
        self.commands.push(Command::SetDrawBuffers(buffers.to_vec()));
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.viewport = rect;
        self.commands.push(Command::SetViewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<PixelRect>) {
        self.scissor = rect;
        self.commands.push(Command::SetScissor(rect));
    }

    fn clear(&mut self, flags: ClearFlags) {
        let region = match self.scissor {
            Some(rect) => rect,
            None => {
                let (width, height) = self.target_size(self.bound_target);
                PixelRect::full(width, height)
            }
        };
        self.commands.push(Command::Clear {
            target: self.bound_target,
            flags,
            region,
        });
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.bound_program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) {
        if let Some(record) = self.programs.get_mut(program) {
            record.uniforms.insert(name.to_owned(), value);
        }
        self.commands.push(Command::SetUniform {
            program,
            name: name.to_owned(),
            value,
        });
    }

    fn draw(&mut self, call: DrawCall) {
        self.commands.push(Command::Draw {
            target: self.bound_target,
            program: self.bound_program,
            viewport: self.viewport,
            scissor: self.scissor,
            call,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{CubeFace, TextureFormat};

    fn depth_texture(device: &mut HeadlessDevice, size: u32) -> TextureHandle {
        let desc = TextureDesc::attachment("depth", size, TextureDimension::D2, TextureFormat::Depth32Float);
        device.create_texture(&desc).unwrap()
    }

    fn target_with(
        device: &mut HeadlessDevice,
        attachments: Vec<(AttachmentSlot, AttachmentView)>,
        draw_buffers: Vec<AttachmentSlot>,
    ) -> RenderTargetHandle {
        let desc = RenderTargetDesc {
            label: "test".into(),
            attachments,
            draw_buffers,
        };
        device.create_render_target(&desc).unwrap()
    }

    #[test]
    fn test_depth_only_target_is_complete() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 1024);
        let target = target_with(&mut device, vec![(AttachmentSlot::Depth, AttachmentView::whole(depth))], vec![]);

        assert_eq!(device.target_status(target), TargetStatus::Complete);
    }

    #[test]
    fn test_empty_target_is_missing_attachment() {
        let mut device = HeadlessDevice::new();
        let target = target_with(&mut device, vec![], vec![]);
        assert_eq!(device.target_status(target), TargetStatus::MissingAttachment);
    }

    #[test]
    fn test_oversized_texture_makes_target_incomplete() {
        let mut device = HeadlessDevice::with_limits(DeviceLimits {
            max_texture_size: 1024,
            ..Default::default()
        });
        let depth = depth_texture(&mut device, 2048);
        let target = target_with(&mut device, vec![(AttachmentSlot::Depth, AttachmentView::whole(depth))], vec![]);

        assert_eq!(device.target_status(target), TargetStatus::IncompleteAttachment);
    }

    #[test]
    fn test_strict_limits_reject_oversized_texture() {
        let mut device = HeadlessDevice::with_limits(DeviceLimits {
            max_texture_size: 1024,
            ..Default::default()
        })
        .with_strict_limits();
        let desc = TextureDesc::attachment("big", 4096, TextureDimension::D2, TextureFormat::Depth32Float);

        assert!(matches!(
            device.create_texture(&desc),
            Err(DeviceError::TextureTooLarge { max: 1024, .. })
        ));
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_mismatched_sizes() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 1024);
        let color = device
            .create_texture(&TextureDesc::attachment("color", 512, TextureDimension::D2, TextureFormat::Rgba16Float))
            .unwrap();
        let target = target_with(
            &mut device,
            vec![
                (AttachmentSlot::Depth, AttachmentView::whole(depth)),
                (AttachmentSlot::Color(0), AttachmentView::whole(color)),
            ],
            vec![AttachmentSlot::Color(0)],
        );

        assert_eq!(device.target_status(target), TargetStatus::MismatchedSize);
    }

    #[test]
    fn test_depth_format_in_color_slot() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 256);
        let target = target_with(&mut device, vec![(AttachmentSlot::Color(0), AttachmentView::whole(depth))], vec![]);

        assert_eq!(device.target_status(target), TargetStatus::UnsupportedFormat);
    }

    #[test]
    fn test_draw_buffer_without_attachment() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 256);
        let target = target_with(
            &mut device,
            vec![(AttachmentSlot::Depth, AttachmentView::whole(depth))],
            vec![AttachmentSlot::Color(1)],
        );

        assert_eq!(device.target_status(target), TargetStatus::MissingAttachment);
    }

    #[test]
    fn test_cube_face_attachment() {
        let mut device = HeadlessDevice::new();
        let cube = device
            .create_texture(&TextureDesc::attachment("cube", 512, TextureDimension::Cube, TextureFormat::Depth32Float))
            .unwrap();
        let target = target_with(
            &mut device,
            vec![(AttachmentSlot::Depth, AttachmentView::face(cube, CubeFace::NegativeZ))],
            vec![],
        );
        assert!(device.target_status(target).is_complete());

        let out_of_range = AttachmentView { texture: cube, layer: Some(6) };
        device.attach(target, AttachmentSlot::Depth, out_of_range).unwrap();
        assert_eq!(device.target_status(target), TargetStatus::IncompleteAttachment);
    }

    #[test]
    fn test_destroyed_texture_leaves_target_incomplete() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 256);
        let target = target_with(&mut device, vec![(AttachmentSlot::Depth, AttachmentView::whole(depth))], vec![]);

        device.destroy_texture(depth);
        assert_eq!(device.target_status(target), TargetStatus::MissingAttachment);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_clear_respects_scissor() {
        let mut device = HeadlessDevice::new();
        let depth = depth_texture(&mut device, 2048);
        let target = target_with(&mut device, vec![(AttachmentSlot::Depth, AttachmentView::whole(depth))], vec![]);

        device.bind_render_target(Some(target));
        device.clear(ClearFlags::DEPTH);
        let tile = PixelRect::new(1024, 0, 1024, 1024);
        device.set_scissor(Some(tile));
        device.clear(ClearFlags::DEPTH);

        let regions: Vec<PixelRect> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Clear { region, .. } => Some(*region),
                _ => None,
            })
            .collect();
        assert_eq!(regions, vec![PixelRect::full(2048, 2048), tile]);
    }

    #[test]
    fn test_empty_shader_fails_to_compile() {
        let mut device = HeadlessDevice::new();
        let source = ProgramSource::new("broken", "void main() {}", "   ");

        assert!(matches!(
            device.compile_program(&source),
            Err(DeviceError::ShaderCompile { .. })
        ));
    }

    #[test]
    fn test_uniforms_are_tracked_per_program() {
        let mut device = HeadlessDevice::new();
        let program = device
            .compile_program(&ProgramSource::new("p", "void main() {}", "void main() {}"))
            .unwrap();

        device.set_uniform(program, "farPlane", UniformValue::Float(25.0));
        assert_eq!(device.uniform(program, "farPlane"), Some(UniformValue::Float(25.0)));
        assert_eq!(device.uniform(program, "lightPos"), None);
    }
}
