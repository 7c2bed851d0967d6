//! Frustum culling types
//!
//! Planes are extracted from a combined view-projection matrix with the
//! Gribb/Hartmann method. Every plane normal points inward, toward the
//! visible region, and is normalized to unit length so plane distances are
//! true Euclidean distances.

use glam::{Mat4, Vec3, Vec4};

/// Plane in 3D space (`normal · p + distance = 0`)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal (unit vector)
    pub normal: Vec3,
    /// Signed offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane from an unnormalized `(a, b, c, d)` equation
    ///
    /// Degenerate equations collapse to the XZ plane.
    #[inline]
    pub fn from_equation(equation: Vec4) -> Self {
        let normal = equation.truncate();
        let len = normal.length();
        if len > crate::consts::EPSILON {
            Self {
                normal: normal / len,
                distance: equation.w / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    /// Create a plane from a point on the plane and its normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance from a point to the plane
    ///
    /// Positive = in front (visible side), negative = behind.
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}

/// View frustum made of six inward-facing planes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Extract the six clip planes of a view-projection matrix
    pub fn from_matrix(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        Self {
            planes: [
                Plane::from_equation(r3 + r0),
                Plane::from_equation(r3 - r0),
                Plane::from_equation(r3 + r1),
                Plane::from_equation(r3 - r1),
                Plane::from_equation(r3 + r2),
                Plane::from_equation(r3 - r2),
            ],
        }
    }

    /// Build a frustum from explicit planes (left, right, bottom, top, near, far)
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// The planes in left, right, bottom, top, near, far order
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Access a single plane by index (see the associated constants)
    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    /// Returns false only when the box is entirely behind some plane
    ///
    /// For each plane the corner furthest along the normal (the positive
    /// vertex) is tested; boxes straddling or touching a plane count as
    /// visible.
    pub fn is_aabb_inside(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { max.x } else { min.x },
                if plane.normal.y >= 0.0 { max.y } else { min.y },
                if plane.normal.z >= 0.0 { max.z } else { min.z },
            );
            plane.distance_to_point(positive) >= 0.0
        })
    }

    /// Returns false only when the sphere is entirely behind some plane
    pub fn is_sphere_inside(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Test if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_yields_clip_cube() {
        let frustum = Frustum::from_matrix(&Mat4::IDENTITY);

        let expected = [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];

        for (plane, normal) in frustum.planes().iter().zip(expected) {
            assert!((plane.normal - normal).length() < 1e-6);
            assert!((plane.distance - 1.0).abs() < 1e-6);
            assert!((plane.normal.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_aabb_inside_and_outside() {
        let frustum = Frustum::from_matrix(&Mat4::IDENTITY);

        assert!(frustum.is_aabb_inside(Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert!(!frustum.is_aabb_inside(
            Vec3::new(1.5, -0.5, -0.5),
            Vec3::new(2.0, 0.5, 0.5),
        ));
    }

    #[test]
    fn test_aabb_partial_and_touching_count_as_inside() {
        let frustum = Frustum::from_matrix(&Mat4::IDENTITY);

        // Straddles the right plane
        assert!(frustum.is_aabb_inside(Vec3::new(0.5, 0.0, 0.0), Vec3::new(3.0, 0.5, 0.5)));
        // Touches the right plane at x = 1
        assert!(frustum.is_aabb_inside(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn test_sphere_visibility() {
        let frustum = Frustum::from_matrix(&Mat4::IDENTITY);

        assert!(frustum.is_sphere_inside(Vec3::ZERO, 0.25));
        // Center outside, but the sphere reaches back into the cube
        assert!(frustum.is_sphere_inside(Vec3::new(1.5, 0.0, 0.0), 0.75));
        assert!(!frustum.is_sphere_inside(Vec3::new(3.0, 0.0, 0.0), 1.0));
        assert!(!frustum.is_sphere_inside(Vec3::new(0.0, -4.0, 0.0), 0.5));
    }

    #[test]
    fn test_perspective_frustum() {
        let proj = Mat4::perspective_rh_gl(core::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let frustum = Frustum::from_matrix(&(proj * view));

        // In front of the camera
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(frustum.is_sphere_inside(Vec3::new(0.0, 0.0, -50.0), 1.0));

        // Behind the camera
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.is_aabb_inside(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 6.0)));

        // Beyond the far plane
        assert!(!frustum.is_sphere_inside(Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn test_plane_distance_to_point() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);

        assert!((plane.distance_to_point(Vec3::new(0.0, 0.0, 5.0)) - 5.0).abs() < 1e-6);
        assert!((plane.distance_to_point(Vec3::new(0.0, 0.0, -3.0)) + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_equation() {
        let plane = Plane::from_equation(Vec4::new(0.0, 0.0, 0.0, 3.0));
        assert_eq!(plane, Plane::default());
    }
}
