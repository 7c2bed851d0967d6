//! Shadow Atlas
//!
//! Packs the shadow maps of several lights into one shared render target.
//! The atlas is a grid of equally sized square tiles; [`AtlasLayout`] is the
//! pure grid computation and [`ShadowAtlas`] owns the GPU targets.
//!
//! # Grid
//!
//! For `n` lights the grid is `tiles_x = ceil(sqrt(n))` columns by
//! `tiles_y = ceil(n / tiles_x)` rows, so it is as square as possible and
//! never has a completely empty row.

use serde::{Deserialize, Serialize};

use crate::device::RenderDevice;
use crate::resource::{
    AttachmentSlot, AttachmentView, PixelRect, RenderTargetDesc, RenderTargetHandle, TextureDesc,
    TextureDimension, TextureHandle,
};

use super::error::ShadowResult;
use super::targets::{build_group, RSM_COLOR_FORMAT, RSM_DRAW_BUFFERS, SHADOW_DEPTH_FORMAT};

/// Normalized sub-rectangle of the atlas, in `[0, 1]`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl AtlasRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole texture
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// True if the interiors intersect (shared edges do not count)
    pub fn overlaps(&self, other: &AtlasRect) -> bool {
        const EPS: f32 = 1e-6;
        self.x + EPS < other.x + other.width
            && other.x + EPS < self.x + self.width
            && self.y + EPS < other.y + other.height
            && other.y + EPS < self.y + self.height
    }

    /// Map a `[0, 1]` shadow-map UV into this rectangle
    pub fn transform_uv(&self, u: f32, v: f32) -> (f32, f32) {
        (self.x + u * self.width, self.y + v * self.height)
    }

    /// Layout for shader uniforms: `[x, y, width, height]`
    pub fn to_array(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Tile grid for a given light count
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasLayout {
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Edge length of one tile in pixels
    pub tile_resolution: u32,
    /// Number of lights the layout was computed for
    pub light_count: u32,
}

impl AtlasLayout {
    /// Compute the grid for `light_count` tiles of `tile_resolution` pixels
    ///
    /// Zero lights yields a 1x1 grid.
    pub fn for_light_count(light_count: u32, tile_resolution: u32) -> Self {
        let n = light_count.max(1);
        let tiles_x = ceil_sqrt(n);
        let tiles_y = n.div_ceil(tiles_x);

        Self {
            tiles_x,
            tiles_y,
            tile_resolution,
            light_count,
        }
    }

    /// Number of tiles in the grid
    pub fn capacity(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Atlas texture size in pixels
    pub fn atlas_size(&self) -> (u32, u32) {
        (
            self.tiles_x * self.tile_resolution,
            self.tiles_y * self.tile_resolution,
        )
    }

    /// Normalized rectangle of tile `index`
    pub fn rect(&self, index: u32) -> Option<AtlasRect> {
        if index >= self.capacity() {
            return None;
        }
        let col = index % self.tiles_x;
        let row = index / self.tiles_x;
        let width = 1.0 / self.tiles_x as f32;
        let height = 1.0 / self.tiles_y as f32;

        Some(AtlasRect::new(col as f32 * width, row as f32 * height, width, height))
    }

    /// Pixel rectangle of tile `index`
    pub fn pixel_rect(&self, index: u32) -> Option<PixelRect> {
        if index >= self.capacity() {
            return None;
        }
        let res = self.tile_resolution;
        Some(PixelRect::new(
            (index % self.tiles_x) * res,
            (index / self.tiles_x) * res,
            res,
            res,
        ))
    }

    /// Fraction of tiles in use
    pub fn utilization(&self) -> f32 {
        self.light_count.min(self.capacity()) as f32 / self.capacity() as f32
    }
}

fn ceil_sqrt(n: u32) -> u32 {
    let mut root = (n as f64).sqrt() as u32;
    while root * root < n {
        root += 1;
    }
    while root > 1 && (root - 1) * (root - 1) >= n {
        root -= 1;
    }
    root.max(1)
}

/// Shared atlas render target
///
/// Holds a depth texture for standard shadows plus normal and flux buffers
/// so RSM passes can render into the same tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowAtlas {
    layout: AtlasLayout,
    target: RenderTargetHandle,
    depth: TextureHandle,
    normal: TextureHandle,
    color: TextureHandle,
}

impl ShadowAtlas {
    /// Create the GPU targets for `layout`
    pub fn create(device: &mut dyn RenderDevice, layout: AtlasLayout) -> ShadowResult<Self> {
        let (width, height) = layout.atlas_size();
        build_group(device, "shadow atlas", |device, group| {
            let depth = group.texture(
                device,
                &TextureDesc::attachment_2d("shadow atlas depth", width, height, TextureDimension::D2, SHADOW_DEPTH_FORMAT),
            )?;
            let normal = group.texture(
                device,
                &TextureDesc::attachment_2d("shadow atlas normal", width, height, TextureDimension::D2, RSM_COLOR_FORMAT),
            )?;
            let color = group.texture(
                device,
                &TextureDesc::attachment_2d("shadow atlas flux", width, height, TextureDimension::D2, RSM_COLOR_FORMAT),
            )?;
            let target = group.target(
                device,
                &RenderTargetDesc {
                    label: "shadow atlas".into(),
                    attachments: vec![
                        (AttachmentSlot::Color(0), AttachmentView::whole(normal)),
                        (AttachmentSlot::Color(1), AttachmentView::whole(color)),
                        (AttachmentSlot::Depth, AttachmentView::whole(depth)),
                    ],
                    draw_buffers: RSM_DRAW_BUFFERS.to_vec(),
                },
            )?;

            log::debug!(
                "Shadow atlas {}x{} ({}x{} tiles of {})",
                width,
                height,
                layout.tiles_x,
                layout.tiles_y,
                layout.tile_resolution
            );

            Ok(Self {
                layout,
                target,
                depth,
                normal,
                color,
            })
        })
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_render_target(self.target);
        device.destroy_texture(self.depth);
        device.destroy_texture(self.normal);
        device.destroy_texture(self.color);
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn target(&self) -> RenderTargetHandle {
        self.target
    }

    pub fn depth(&self) -> TextureHandle {
        self.depth
    }

    pub fn normal(&self) -> TextureHandle {
        self.normal
    }

    pub fn color(&self) -> TextureHandle {
        self.color
    }

    /// Full atlas in pixels
    pub fn full_rect(&self) -> PixelRect {
        let (width, height) = self.layout.atlas_size();
        PixelRect::full(width, height)
    }

    /// Whether this atlas already matches a requested allocation
    pub fn matches(&self, light_count: u32, tile_resolution: u32) -> bool {
        self.layout.light_count == light_count && self.layout.tile_resolution == tile_resolution
    }
}
