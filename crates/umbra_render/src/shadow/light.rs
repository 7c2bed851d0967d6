//! Shadow-casting lights
//!
//! Lights carry the light-space transforms the shadow passes render with,
//! plus the shadow resources they own. [`LightSet`] stores them under stable
//! ids so the shadow and lighting passes can refer to the same light without
//! holding references across the frame.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use umbra_math::consts::CUBE_FACE_FOV;

use crate::device::RenderDevice;
use crate::resource::CubeFace;

use super::resource::{LightShadowMap, PointShadowMap, ShadowResource};

/// Unique identifier for a light within a [`LightSet`]
pub type LightId = u64;

/// Near plane used for perspective shadow projections
pub const SHADOW_NEAR_PLANE: f32 = 0.1;

/// Pick an up vector that is not parallel to `direction`
pub(crate) fn find_up_vector(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().y.abs() > 0.9 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Sun-like light with parallel rays
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels (towards the scene)
    pub direction: Vec3,
    /// Light-space view-projection used for the shadow pass
    pub light_space: Mat4,
    pub shadow: LightShadowMap,
}

impl DirectionalLight {
    /// Light covering a 50 unit radius around the origin
    pub fn new(label: impl Into<String>, direction: Vec3, resolution: u32) -> Self {
        let mut light = Self {
            direction: direction.normalize_or_zero(),
            light_space: Mat4::IDENTITY,
            shadow: LightShadowMap::new(label, resolution),
        };
        light.fit_to_sphere(Vec3::ZERO, 50.0);
        light
    }

    /// Fit the orthographic shadow projection around a bounding sphere
    pub fn fit_to_sphere(&mut self, center: Vec3, radius: f32) {
        let radius = radius.max(f32::EPSILON);
        let eye = center - self.direction * radius * 2.0;
        let view = Mat4::look_at_rh(eye, center, find_up_vector(self.direction));
        let proj = Mat4::orthographic_rh_gl(-radius, radius, -radius, radius, 0.0, radius * 4.0);
        self.light_space = proj * view;
    }

    /// Fit the projection around an axis-aligned box
    pub fn fit_to_bounds(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        self.fit_to_sphere(center, (max - min).length() * 0.5);
    }
}

/// Cone light
#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    /// Half angle of the cone in radians
    pub outer_angle: f32,
    pub range: f32,
    pub light_space: Mat4,
    pub shadow: LightShadowMap,
}

impl SpotLight {
    pub fn new(
        label: impl Into<String>,
        position: Vec3,
        direction: Vec3,
        outer_angle: f32,
        range: f32,
        resolution: u32,
    ) -> Self {
        let mut light = Self {
            position,
            direction: direction.normalize_or_zero(),
            outer_angle,
            range,
            light_space: Mat4::IDENTITY,
            shadow: LightShadowMap::new(label, resolution),
        };
        light.update_light_space();
        light
    }

    /// Recompute `light_space` after moving the light
    pub fn update_light_space(&mut self) {
        let fov = (self.outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
        let far = self.range.max(SHADOW_NEAR_PLANE * 2.0);
        let view = Mat4::look_at_rh(
            self.position,
            self.position + self.direction,
            find_up_vector(self.direction),
        );
        let proj = Mat4::perspective_rh_gl(fov, 1.0, SHADOW_NEAR_PLANE, far);
        self.light_space = proj * view;
    }
}

/// Omnidirectional light
#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub range: f32,
    pub shadow: PointShadowMap,
}

impl PointLight {
    pub fn new(label: impl Into<String>, position: Vec3, range: f32, resolution: u32) -> Self {
        Self {
            position,
            range,
            shadow: PointShadowMap::new(label, resolution),
        }
    }

    /// Per-face transforms for the current position and range
    pub fn cube_view(&self) -> CubeShadowView {
        CubeShadowView::from_position(self.position, SHADOW_NEAR_PLANE, self.range)
    }
}

/// Six view-projection matrices of a cube shadow map
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeShadowView {
    /// Indexed by `CubeFace::layer`
    pub face_matrices: [Mat4; 6],
    pub position: Vec3,
    pub far_plane: f32,
}

impl CubeShadowView {
    /// 90 degree perspective per face, looking down each axis
    pub fn from_position(position: Vec3, near: f32, far: f32) -> Self {
        let proj = Mat4::perspective_rh_gl(CUBE_FACE_FOV, 1.0, near, far);
        let face_matrices = CubeFace::ALL.map(|face| {
            proj * Mat4::look_at_rh(position, position + face.direction(), face.up())
        });

        Self {
            face_matrices,
            position,
            far_plane: far,
        }
    }

    pub fn face_matrix(&self, face: CubeFace) -> Mat4 {
        self.face_matrices[face.layer() as usize]
    }
}

/// Owning container for shadow-casting lights
#[derive(Debug, Default)]
pub struct LightSet {
    next_id: LightId,
    directional: BTreeMap<LightId, DirectionalLight>,
    spot: BTreeMap<LightId, SpotLight>,
    point: BTreeMap<LightId, PointLight>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> LightId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_directional(&mut self, light: DirectionalLight) -> LightId {
        let id = self.allocate_id();
        self.directional.insert(id, light);
        id
    }

    pub fn add_spot(&mut self, light: SpotLight) -> LightId {
        let id = self.allocate_id();
        self.spot.insert(id, light);
        id
    }

    pub fn add_point(&mut self, light: PointLight) -> LightId {
        let id = self.allocate_id();
        self.point.insert(id, light);
        id
    }

    /// Remove a light and release its shadow resources
    pub fn remove(&mut self, device: &mut dyn RenderDevice, id: LightId) -> bool {
        if let Some(mut light) = self.directional.remove(&id) {
            light.shadow.release(device);
            return true;
        }
        if let Some(mut light) = self.spot.remove(&id) {
            light.shadow.release(device);
            return true;
        }
        if let Some(mut light) = self.point.remove(&id) {
            light.shadow.release(device);
            return true;
        }
        false
    }

    pub fn directional(&self, id: LightId) -> Option<&DirectionalLight> {
        self.directional.get(&id)
    }

    pub fn directional_mut(&mut self, id: LightId) -> Option<&mut DirectionalLight> {
        self.directional.get_mut(&id)
    }

    pub fn spot(&self, id: LightId) -> Option<&SpotLight> {
        self.spot.get(&id)
    }

    pub fn spot_mut(&mut self, id: LightId) -> Option<&mut SpotLight> {
        self.spot.get_mut(&id)
    }

    pub fn point(&self, id: LightId) -> Option<&PointLight> {
        self.point.get(&id)
    }

    pub fn point_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        self.point.get_mut(&id)
    }

    /// Directional lights in id order
    pub fn directional_lights(&self) -> impl Iterator<Item = (LightId, &DirectionalLight)> {
        self.directional.iter().map(|(id, light)| (*id, light))
    }

    pub fn spot_lights(&self) -> impl Iterator<Item = (LightId, &SpotLight)> {
        self.spot.iter().map(|(id, light)| (*id, light))
    }

    pub fn point_lights(&self) -> impl Iterator<Item = (LightId, &PointLight)> {
        self.point.iter().map(|(id, light)| (*id, light))
    }

    pub(crate) fn directional_lights_mut(&mut self) -> impl Iterator<Item = (LightId, &mut DirectionalLight)> {
        self.directional.iter_mut().map(|(id, light)| (*id, light))
    }

    pub(crate) fn spot_lights_mut(&mut self) -> impl Iterator<Item = (LightId, &mut SpotLight)> {
        self.spot.iter_mut().map(|(id, light)| (*id, light))
    }

    pub(crate) fn point_lights_mut(&mut self) -> impl Iterator<Item = (LightId, &mut PointLight)> {
        self.point.iter_mut().map(|(id, light)| (*id, light))
    }

    /// Lights that can be packed into the shadow atlas
    pub fn atlas_light_count(&self) -> usize {
        self.directional.len() + self.spot.len()
    }

    pub fn len(&self) -> usize {
        self.directional.len() + self.spot.len() + self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the shadow resources of every light, keeping the lights
    pub fn release_all(&mut self, device: &mut dyn RenderDevice) {
        for light in self.directional.values_mut() {
            light.shadow.release(device);
        }
        for light in self.spot.values_mut() {
            light.shadow.release(device);
        }
        for light in self.point.values_mut() {
            light.shadow.release(device);
        }
    }
}
