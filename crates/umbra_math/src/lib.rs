//! # umbra_math - Culling Math
//!
//! Thin layer over `glam` with the view-volume types used by the shadow
//! subsystem: planes extracted from a combined view-projection matrix and
//! conservative box/sphere visibility tests.
//!
//! All clip-space conventions follow OpenGL: the canonical view volume is
//! the `[-1, 1]` cube on every axis.

pub mod frustum;

pub use frustum::{Frustum, Plane};
pub use glam::{Mat4, Vec3, Vec4};

/// Common math constants
pub mod consts {
    pub const EPSILON: f32 = 1e-6;
    /// Field of view of one cube-map face
    pub const CUBE_FACE_FOV: f32 = core::f32::consts::FRAC_PI_2;
}

pub mod prelude {
    pub use crate::frustum::{Frustum, Plane};
    pub use glam::{Mat4, Vec3, Vec4};
}
