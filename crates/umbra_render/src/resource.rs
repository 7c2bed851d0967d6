//! Render Resources - GPU resource descriptions
//!
//! Abstract descriptions of the textures, samplers, render targets and
//! programs the shadow subsystem asks a device for. Backends translate them
//! into native objects.

use core::fmt;
use core::ops::BitOr;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::handle::Handle;

/// Marker for texture handles
#[derive(Debug)]
pub enum Texture {}
/// Marker for sampler handles
#[derive(Debug)]
pub enum Sampler {}
/// Marker for render target (framebuffer) handles
#[derive(Debug)]
pub enum RenderTarget {}
/// Marker for shader program handles
#[derive(Debug)]
pub enum Program {}

pub type TextureHandle = Handle<Texture>;
pub type SamplerHandle = Handle<Sampler>;
pub type RenderTargetHandle = Handle<RenderTarget>;
pub type ProgramHandle = Handle<Program>;

/// Texture format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth24Plus,
    Depth32Float,
}

impl TextureFormat {
    /// Check if this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth24Plus | Self::Depth32Float)
    }

    /// Bytes per texel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::R32Float | Self::Depth24Plus | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Texture dimension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    /// Six square faces addressed as layers 0..6
    Cube,
}

/// Texture usage flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureUsage(pub u32);

impl TextureUsage {
    pub const TEXTURE_BINDING: Self = Self(1 << 0);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 1);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// A square render-attachment texture that can also be sampled
    pub fn attachment(
        label: impl Into<String>,
        size: u32,
        dimension: TextureDimension,
        format: TextureFormat,
    ) -> Self {
        Self::attachment_2d(label, size, size, dimension, format)
    }

    /// A render-attachment texture with independent width and height
    pub fn attachment_2d(
        label: impl Into<String>,
        width: u32,
        height: u32,
        dimension: TextureDimension,
        format: TextureFormat,
    ) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            dimension,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    /// Number of addressable layers (6 for cube textures)
    pub fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }

    /// Approximate memory footprint in bytes
    pub fn byte_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.layers() as u64
            * self.format.bytes_per_pixel() as u64
    }
}

/// Sampler filter mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Sampler address mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    ClampToBorder,
    Repeat,
}

/// Compare function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Greater,
    Always,
}

/// Sampler descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerDesc {
    pub label: String,
    pub address_mode: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// Compare function for depth samplers
    pub compare: Option<CompareFunction>,
}

impl SamplerDesc {
    /// Hardware depth-comparison sampler (PCF-capable)
    pub fn shadow_comparison(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            compare: Some(CompareFunction::LessEqual),
        }
    }
}

/// Attachment point on a render target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentSlot {
    Color(u8),
    Depth,
}

/// Texture (and optional layer / cube face) bound to an attachment slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentView {
    pub texture: TextureHandle,
    /// Layer for layered textures; cube faces use `CubeFace::layer`
    pub layer: Option<u32>,
}

impl AttachmentView {
    pub fn whole(texture: TextureHandle) -> Self {
        Self { texture, layer: None }
    }

    pub fn face(texture: TextureHandle, face: CubeFace) -> Self {
        Self {
            texture,
            layer: Some(face.layer()),
        }
    }
}

/// Render target (framebuffer) descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct RenderTargetDesc {
    pub label: String,
    pub attachments: Vec<(AttachmentSlot, AttachmentView)>,
    /// Color attachments written simultaneously by the fragment stage
    pub draw_buffers: Vec<AttachmentSlot>,
}

/// Completeness status of a render target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    Complete,
    /// No attachments, or an attachment/draw buffer references nothing
    MissingAttachment,
    /// An attachment exists but cannot be rendered to
    IncompleteAttachment,
    /// Attachments disagree in size
    MismatchedSize,
    /// Format does not fit the attachment slot
    UnsupportedFormat,
}

impl TargetStatus {
    pub fn is_complete(&self) -> bool {
        *self == Self::Complete
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Complete => "complete",
            Self::MissingAttachment => "missing attachment",
            Self::IncompleteAttachment => "incomplete attachment",
            Self::MismatchedSize => "mismatched attachment sizes",
            Self::UnsupportedFormat => "unsupported attachment format",
        };
        f.write_str(text)
    }
}

/// Pixel-space rectangle (origin bottom-left)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// True if the two rectangles share any interior pixel
    pub fn overlaps(&self, other: &PixelRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// Buffers cleared by [`RenderDevice::clear`](crate::RenderDevice::clear)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearFlags(pub u8);

impl ClearFlags {
    pub const COLOR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for ClearFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Typed uniform value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec3(Vec3),
    Float(f32),
    Int(i32),
}

/// Shader program source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSource {
    pub fn new(label: impl Into<String>, vertex: &str, fragment: &str) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.to_owned(),
            fragment: fragment.to_owned(),
        }
    }
}

/// Geometry identifier owned by the mesh system
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// A single indexed draw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawCall {
    pub mesh: MeshId,
    pub index_count: u32,
}

/// Cube map face, in the canonical +X, -X, +Y, -Y, +Z, -Z layer order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub const fn layer(self) -> u32 {
        self as u32
    }

    /// View direction through the center of the face
    pub fn direction(self) -> Vec3 {
        match self {
            Self::PositiveX => Vec3::X,
            Self::NegativeX => Vec3::NEG_X,
            Self::PositiveY => Vec3::Y,
            Self::NegativeY => Vec3::NEG_Y,
            Self::PositiveZ => Vec3::Z,
            Self::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector for the face's view matrix
    ///
    /// The Y faces use Z as up; using Y there would make the look-at cross
    /// product degenerate.
    pub fn up(self) -> Vec3 {
        match self {
            Self::PositiveY => Vec3::Z,
            Self::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}
