use glam::{EulerRot, Quat, Vec3};
use thiserror::Error;

use crate::math_utils::rotate_canonical_axes;

/// Lens settings of a camera object in the host scene.
///
/// Cameras follow the host convention of looking down their local -Z axis with
/// +Y as up. Where the camera sits and how it is oriented comes from the
/// owning scene object's world transform, not from the lens.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// The field of view for the camera in radians.
    fov: f32,
    /// The minimum camera view distance. Anything closer than `clip_start`
    /// will not be rendered.
    clip_start: f32,
    /// The maximum camera view distance. Anything further than `clip_end`
    /// will not be rendered.
    clip_end: f32,
}

impl Camera {
    /// Create a new camera lens with a field of view `fov` (radians) and the
    /// given clip distances.
    pub fn new(fov: f32, clip_start: f32, clip_end: f32) -> Result<Self, InvalidCamera> {
        if !(fov > 0.0 && fov < std::f32::consts::PI) {
            return Err(InvalidCamera::FieldOfView(fov));
        }

        if !(clip_start >= 0.0 && clip_end > clip_start) {
            return Err(InvalidCamera::ClipRange(clip_start, clip_end));
        }

        Ok(Self {
            fov,
            clip_start,
            clip_end,
        })
    }

    /// Get the field of view in radians.
    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Get the `(near, far)` clip distances.
    pub fn clip(&self) -> (f32, f32) {
        (self.clip_start, self.clip_end)
    }

    /// Orient this lens with a world space `rotation`, returning where the
    /// camera looks and which way is up.
    pub fn orient(&self, rotation: Quat) -> CameraOrientation {
        let (direction, up) = rotate_canonical_axes(rotation);
        let (x, y, z) = rotation.normalize().to_euler(EulerRot::XYZ);

        CameraOrientation {
            euler: Vec3::new(x, y, z),
            direction,
            up,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        // Matches the host's default 50mm lens on a 36mm sensor.
        Self {
            fov: 0.691_111_4,
            clip_start: 0.1,
            clip_end: 100.0,
        }
    }
}

/// World space orientation of a camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraOrientation {
    /// XYZ Euler angles in radians.
    pub euler: Vec3,
    /// Unit vector the camera looks along.
    pub direction: Vec3,
    /// Unit vector orthogonal to `direction` pointing up.
    pub up: Vec3,
}

#[derive(Debug, Error, PartialEq)]
pub enum InvalidCamera {
    #[error("camera field of view must be within (0, pi) radians but was {0}")]
    FieldOfView(f32),
    #[error("camera clip range must satisfy 0 <= start < end but start was {0} and end was {1}")]
    ClipRange(f32, f32),
}
