//! Render device abstraction
//!
//! `RenderDevice` is the seam between the shadow subsystem and a graphics
//! API. The subsystem only creates resources, validates render targets,
//! binds state and issues draws through this trait.

use thiserror::Error;

use crate::resource::{
    AttachmentSlot, AttachmentView, ClearFlags, DrawCall, PixelRect, ProgramHandle,
    ProgramSource, RenderTargetDesc, RenderTargetHandle, SamplerDesc, SamplerHandle,
    TargetStatus, TextureDesc, TextureHandle, UniformValue,
};

/// Device errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Texture '{label}' is {width}x{height}, device maximum is {max}")]
    TextureTooLarge {
        label: String,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("Invalid descriptor '{label}': {reason}")]
    InvalidDescriptor { label: String, reason: String },

    #[error("Shader compilation failed for '{label}': {message}")]
    ShaderCompile { label: String, message: String },

    #[error("Invalid or stale {kind} handle")]
    InvalidHandle { kind: &'static str },
}

/// Capabilities reported by a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest texture edge in pixels
    pub max_texture_size: u32,
    /// Number of simultaneous color attachments
    pub max_color_attachments: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            max_color_attachments: 4,
        }
    }
}

/// Graphics API operations used by the shadow subsystem
pub trait RenderDevice {
    fn limits(&self) -> DeviceLimits;

    // Resources

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, DeviceError>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError>;
    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDesc,
    ) -> Result<RenderTargetHandle, DeviceError>;
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Replace the texture bound to one attachment slot
    fn attach(
        &mut self,
        target: RenderTargetHandle,
        slot: AttachmentSlot,
        view: AttachmentView,
    ) -> Result<(), DeviceError>;

    /// Completeness check, the equivalent of a framebuffer status query
    fn target_status(&self, target: RenderTargetHandle) -> TargetStatus;

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, DeviceError>;
    fn destroy_program(&mut self, program: ProgramHandle);

    // Pass state

    /// Bind a render target; `None` binds the default framebuffer
    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>);
    fn set_draw_buffers(&mut self, buffers: &[AttachmentSlot]);
    fn set_viewport(&mut self, rect: PixelRect);
    /// `None` disables the scissor test
    fn set_scissor(&mut self, rect: Option<PixelRect>);
    /// Clear the bound target, restricted to the scissor rect when enabled
    fn clear(&mut self, flags: ClearFlags);

    fn use_program(&mut self, program: ProgramHandle);
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue);
    fn draw(&mut self, call: DrawCall);
}
