use glam::{Quat, Vec3};

/// The direction a camera or light looks along before any rotation is applied.
pub const CANONICAL_FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

/// The camera's upward direction before any rotation is applied.
pub const CANONICAL_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Rotates the canonical forward and up axes by `rotation`, returning the pair
/// `(direction, up)`. Both results are renormalized to absorb drift from
/// slightly non-unit quaternions.
pub fn rotate_canonical_axes(rotation: Quat) -> (Vec3, Vec3) {
    let rotation = rotation.normalize();
    (
        (rotation * CANONICAL_FORWARD).normalize(),
        (rotation * CANONICAL_UP).normalize(),
    )
}

/// Computes the normal of a planar or nearly planar polygon using Newell's
/// method. Degenerate polygons produce a zero vector.
pub fn polygon_normal(points: impl IntoIterator<Item = Vec3>) -> Vec3 {
    let points: Vec<Vec3> = points.into_iter().collect();
    let mut normal = Vec3::ZERO;

    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }

    normal.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rotation_keeps_canonical_axes() {
        let (direction, up) = rotate_canonical_axes(Quat::IDENTITY);
        assert_eq!(CANONICAL_FORWARD, direction);
        assert_eq!(CANONICAL_UP, up);
    }

    #[test]
    fn rotated_axes_stay_orthonormal() {
        let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.2, 2.5);
        let (direction, up) = rotate_canonical_axes(rotation);

        assert!((direction.length() - 1.0).abs() < 1e-5);
        assert!((up.length() - 1.0).abs() < 1e-5);
        assert!(direction.dot(up).abs() < 1e-5);
    }

    #[test]
    fn counter_clockwise_triangle_faces_positive_z() {
        let normal = polygon_normal([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        assert!(normal.abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn degenerate_polygon_has_zero_normal() {
        let normal = polygon_normal([Vec3::ZERO, Vec3::X, Vec3::X * 2.0]);
        assert_eq!(Vec3::ZERO, normal);
    }
}
