//! Shadow casters
//!
//! Geometry is owned by the mesh system. The shadow passes only need a model
//! matrix, a way to issue the draw, and optionally world-space bounds for
//! culling against the light frustum.

use glam::{Mat4, Vec3};

use crate::device::RenderDevice;
use crate::resource::{DrawCall, MeshId};

/// Geometry that can be rendered into a shadow map
pub trait ShadowCaster {
    /// Object-to-world transform, uploaded as the `model` uniform
    fn model_matrix(&self) -> Mat4;

    /// Issue the draw call(s) for this caster
    fn render(&self, device: &mut dyn RenderDevice);

    /// World-space AABB as `(min, max)`; `None` disables culling
    fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        None
    }
}

/// Single indexed mesh with a transform
#[derive(Clone, Debug, PartialEq)]
pub struct MeshCaster {
    pub mesh: MeshId,
    pub index_count: u32,
    pub transform: Mat4,
    /// Object-space AABB
    pub local_bounds: Option<(Vec3, Vec3)>,
}

impl MeshCaster {
    pub fn new(mesh: MeshId, index_count: u32) -> Self {
        Self {
            mesh,
            index_count,
            transform: Mat4::IDENTITY,
            local_bounds: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_bounds(mut self, min: Vec3, max: Vec3) -> Self {
        self.local_bounds = Some((min, max));
        self
    }
}

impl ShadowCaster for MeshCaster {
    fn model_matrix(&self) -> Mat4 {
        self.transform
    }

    fn render(&self, device: &mut dyn RenderDevice) {
        device.draw(DrawCall {
            mesh: self.mesh,
            index_count: self.index_count,
        });
    }

    fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        let (min, max) = self.local_bounds?;
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ];

        let mut world_min = Vec3::splat(f32::INFINITY);
        let mut world_max = Vec3::splat(f32::NEG_INFINITY);
        for corner in corners {
            let p = self.transform.transform_point3(corner);
            world_min = world_min.min(p);
            world_max = world_max.max(p);
        }
        Some((world_min, world_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_bounds_follow_transform() {
        let caster = MeshCaster::new(MeshId(1), 36)
            .with_bounds(Vec3::splat(-1.0), Vec3::splat(1.0))
            .with_transform(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));

        let (min, max) = caster.world_bounds().unwrap();
        assert!((min - Vec3::new(9.0, -1.0, -1.0)).length() < 1e-5);
        assert!((max - Vec3::new(11.0, 1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_rotated_bounds_stay_conservative() {
        let caster = MeshCaster::new(MeshId(2), 6)
            .with_bounds(Vec3::new(-2.0, 0.0, -0.5), Vec3::new(2.0, 0.1, 0.5))
            .with_transform(Mat4::from_rotation_y(core::f32::consts::FRAC_PI_4));

        let (min, max) = caster.world_bounds().unwrap();
        assert!(max.x > 1.7 && min.x < -1.7);
        assert!(max.z > 1.7 && min.z < -1.7);
    }

    #[test]
    fn test_no_bounds_by_default() {
        assert!(MeshCaster::new(MeshId(3), 3).world_bounds().is_none());
    }
}
