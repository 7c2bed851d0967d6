//! Cascaded Shadow Maps
//!
//! Splits the camera view range into up to four depth slices, each with its
//! own depth target and orthographic light projection. The light sits at a
//! fixed anchor along the light direction and each cascade's projection is
//! sized by its split distance, which is cheap but not fitted to the actual
//! frustum slice.
//!
//! Cascades render standalone and are not driven by the shadow manager.

use glam::{Mat4, Vec3};
use umbra_math::Frustum;

use crate::caster::ShadowCaster;
use crate::device::RenderDevice;
use crate::resource::{ClearFlags, PixelRect, ProgramHandle, TextureDimension, UniformValue};

use super::data::GpuCascadeData;
use super::error::ShadowResult;
use super::light::find_up_vector;
use super::targets::StandardTargets;

/// Maximum number of cascades supported
pub const MAX_CASCADES: usize = 4;

/// Distance of the light anchor from the origin
pub const LIGHT_ANCHOR_DISTANCE: f32 = 50.0;

const CASCADE_NEAR_PLANE: f32 = 0.1;

/// Depth targets and matrices for a cascaded directional shadow
#[derive(Debug)]
pub struct CascadeShadowMap {
    resolution: u32,
    cascades: Vec<StandardTargets>,
    light_space: [Mat4; MAX_CASCADES],
    splits: [f32; MAX_CASCADES],
    camera_view: Mat4,
    camera_view_proj: Mat4,
}

impl Default for CascadeShadowMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeShadowMap {
    /// Empty cascade set; call [`init`](Self::init) before rendering
    pub fn new() -> Self {
        Self {
            resolution: 0,
            cascades: Vec::new(),
            light_space: [Mat4::IDENTITY; MAX_CASCADES],
            splits: [0.0; MAX_CASCADES],
            camera_view: Mat4::IDENTITY,
            camera_view_proj: Mat4::IDENTITY,
        }
    }

    /// Create one depth target per cascade, releasing previous targets
    ///
    /// `cascade_count` is clamped to `1..=MAX_CASCADES`.
    pub fn init(
        &mut self,
        device: &mut dyn RenderDevice,
        resolution: u32,
        cascade_count: u32,
    ) -> ShadowResult<()> {
        self.release(device);

        let count = cascade_count.clamp(1, MAX_CASCADES as u32);
        for i in 0..count {
            let label = format!("cascade {i}");
            match StandardTargets::create(device, &label, resolution, TextureDimension::D2) {
                Ok(targets) => self.cascades.push(targets),
                Err(err) => {
                    self.release(device);
                    return Err(err);
                }
            }
        }

        self.resolution = resolution;
        log::debug!("Initialized {} shadow cascades at {}", count, resolution);
        Ok(())
    }

    /// Practical split scheme blending logarithmic and linear splits
    ///
    /// Returns the far distance of each cascade; unused entries are `far`.
    pub fn calculate_splits(near: f32, far: f32, cascade_count: u32, lambda: f32) -> [f32; MAX_CASCADES] {
        let count = cascade_count.clamp(1, MAX_CASCADES as u32) as usize;
        let lambda = lambda.clamp(0.0, 1.0);
        let near = near.max(f32::EPSILON);
        let mut splits = [far; MAX_CASCADES];

        for (i, split) in splits.iter_mut().enumerate().take(count) {
            let p = (i + 1) as f32 / count as f32;
            let log_split = near * (far / near).powf(p);
            let lin_split = near + (far - near) * p;
            *split = lambda * log_split + (1.0 - lambda) * lin_split;
        }

        splits
    }

    /// Recompute per-cascade light transforms
    ///
    /// `split_distances[i]` is the half extent of cascade `i`'s orthographic
    /// projection and the far view-space depth it covers.
    pub fn update_matrices(
        &mut self,
        view: Mat4,
        proj: Mat4,
        split_distances: [f32; MAX_CASCADES],
        light_dir: Vec3,
    ) {
        let direction = light_dir.normalize_or_zero();
        let light_pos = -direction * LIGHT_ANCHOR_DISTANCE;
        let light_view = Mat4::look_at_rh(light_pos, Vec3::ZERO, find_up_vector(direction));

        for (i, &split) in split_distances.iter().enumerate() {
            let extent = split.max(f32::EPSILON);
            let light_proj = Mat4::orthographic_rh_gl(
                -extent,
                extent,
                -extent,
                extent,
                CASCADE_NEAR_PLANE,
                LIGHT_ANCHOR_DISTANCE + extent,
            );
            self.light_space[i] = light_proj * light_view;
        }

        self.splits = split_distances;
        self.camera_view = view;
        self.camera_view_proj = proj * view;
    }

    /// Cascade covering a positive view-space depth
    pub fn cascade_for_depth(&self, view_depth: f32) -> usize {
        let count = self.cascade_count().max(1);
        self.splits
            .iter()
            .take(count)
            .position(|&split| view_depth < split)
            .unwrap_or(count - 1)
    }

    /// Cascade covering a world-space position, seen from the last camera
    pub fn cascade_for_world_position(&self, position: Vec3) -> usize {
        let view_depth = -self.camera_view.transform_point3(position).z;
        self.cascade_for_depth(view_depth)
    }

    /// View frustum of the camera passed to the last update
    pub fn camera_frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.camera_view_proj)
    }

    /// Render every cascade with `program`
    pub fn render(
        &self,
        device: &mut dyn RenderDevice,
        program: ProgramHandle,
        casters: &[&dyn ShadowCaster],
    ) {
        for (targets, light_space) in self.cascades.iter().zip(self.light_space) {
            device.bind_render_target(Some(targets.target));
            device.set_viewport(PixelRect::full(targets.resolution, targets.resolution));
            device.clear(ClearFlags::DEPTH);
            device.use_program(program);
            device.set_uniform(program, "lightSpaceMatrix", UniformValue::Mat4(light_space));

            for caster in casters {
                device.set_uniform(program, "model", UniformValue::Mat4(caster.model_matrix()));
                caster.render(device);
            }
        }
        device.bind_render_target(None);
    }

    /// Uniform block for the lighting pass
    pub fn shadow_data(&self) -> GpuCascadeData {
        GpuCascadeData {
            matrices: self.light_space.map(|m| m.to_cols_array_2d()),
            splits: self.splits,
            cascade_count: self.cascades.len() as u32,
            _pad: [0; 3],
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        for targets in self.cascades.drain(..) {
            targets.destroy(device);
        }
        self.resolution = 0;
    }

    pub fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cascade(&self, index: usize) -> Option<&StandardTargets> {
        self.cascades.get(index)
    }

    pub fn light_space_matrix(&self, index: usize) -> Option<Mat4> {
        (index < self.cascades.len()).then(|| self.light_space[index])
    }

    pub fn splits(&self) -> &[f32; MAX_CASCADES] {
        &self.splits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceLimits;
    use crate::headless::{Command, HeadlessDevice};
    use crate::resource::ProgramSource;
    use glam::Vec4Swizzles;

    #[test]
    fn test_init_clamps_count() {
        let mut device = HeadlessDevice::new();
        let mut csm = CascadeShadowMap::new();

        csm.init(&mut device, 1024, 9).unwrap();
        assert_eq!(csm.cascade_count(), MAX_CASCADES);

        csm.init(&mut device, 512, 0).unwrap();
        assert_eq!(csm.cascade_count(), 1);
        assert_eq!(device.live_render_targets(), 1);
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn test_failed_init_releases_everything() {
        let mut device = HeadlessDevice::with_limits(DeviceLimits {
            max_texture_size: 512,
            ..Default::default()
        });
        let mut csm = CascadeShadowMap::new();

        assert!(csm.init(&mut device, 1024, 3).is_err());
        assert_eq!(csm.cascade_count(), 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_split_calculation() {
        let splits = CascadeShadowMap::calculate_splits(0.1, 100.0, 4, 0.5);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
        assert!((splits[3] - 100.0).abs() < 1e-3);

        let linear = CascadeShadowMap::calculate_splits(0.0, 100.0, 4, 0.0);
        assert!((linear[0] - 25.0).abs() < 1e-3);

        let two = CascadeShadowMap::calculate_splits(1.0, 50.0, 2, 1.0);
        assert_eq!(two[2], 50.0);
        assert_eq!(two[3], 50.0);
    }

    #[test]
    fn test_cascade_selection() {
        let mut device = HeadlessDevice::new();
        let mut csm = CascadeShadowMap::new();
        csm.init(&mut device, 256, 4).unwrap();
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        csm.update_matrices(view, proj, [10.0, 25.0, 50.0, 100.0], Vec3::new(0.0, -1.0, -0.5));

        assert_eq!(csm.cascade_for_depth(5.0), 0);
        assert_eq!(csm.cascade_for_depth(30.0), 2);
        assert_eq!(csm.cascade_for_depth(500.0), 3);
        assert_eq!(csm.cascade_for_world_position(Vec3::new(0.0, 0.0, -12.0)), 1);
        assert!(csm.camera_frustum().contains_point(Vec3::new(0.0, 0.0, -12.0)));
    }

    #[test]
    fn test_origin_centered_in_every_cascade() {
        let mut csm = CascadeShadowMap::new();
        csm.update_matrices(Mat4::IDENTITY, Mat4::IDENTITY, [5.0, 10.0, 20.0, 40.0], Vec3::NEG_Y);

        for (i, m) in csm.light_space.iter().enumerate() {
            let clip = *m * Vec3::ZERO.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "cascade {i}");
            assert!(ndc.z > -1.0 && ndc.z < 1.0, "cascade {i}");
        }

        let edge = csm.light_space[0] * Vec3::new(5.0, 0.0, 0.0).extend(1.0);
        assert!((edge.x.abs() - 1.0).abs() < 1e-4 || (edge.y.abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_render_binds_each_cascade() {
        let mut device = HeadlessDevice::new();
        let program = device
            .compile_program(&ProgramSource::new("csm", "void main() {}", "void main() {}"))
            .unwrap();
        let mut csm = CascadeShadowMap::new();
        csm.init(&mut device, 256, 3).unwrap();

        let caster = crate::caster::MeshCaster::new(crate::resource::MeshId(7), 36);
        csm.render(&mut device, program, &[&caster]);

        let binds: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindRenderTarget(Some(t)) => Some(*t),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..3).map(|i| csm.cascade(i).unwrap().target).collect();
        assert_eq!(binds, expected);
        assert_eq!(device.draw_count(), 3);
        assert_eq!(device.bound_render_target(), None);
        assert_eq!(csm.shadow_data().cascade_count, 3);
    }
}
