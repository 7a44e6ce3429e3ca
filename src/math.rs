//! Math helpers for 3D rigid body simulation on top of [`vek`].

use vek::{Mat3, Quaternion, Vec3};

/// Smallest quaternion norm that can still be normalized.
const MIN_NORMALIZABLE: f64 = 1e-12;

/// Position with an orientation basis.
///
/// World transform of a body, the columns of the basis are the body's
/// local axes expressed in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iso {
    /// Position of the origin.
    pub pos: Vec3<f64>,
    /// Rotation part, always orthonormal.
    pub basis: Mat3<f64>,
}

impl Iso {
    /// Construct from a position and an orientation quaternion.
    pub fn new(pos: Vec3<f64>, orientation: Quaternion<f64>) -> Self {
        let basis = rotation_matrix(orientation);

        Self { pos, basis }
    }

    /// Identity transform at the world origin.
    pub fn identity() -> Self {
        Self {
            pos: Vec3::zero(),
            basis: Mat3::identity(),
        }
    }

    /// Local axis in world coordinates.
    ///
    /// Index 0, 1 and 2 map to the local X, Y and Z axes.
    pub fn axis(&self, index: usize) -> Vec3<f64> {
        self.basis.cols[index]
    }

    /// Map a local point to world coordinates.
    pub fn transform(&self, point: Vec3<f64>) -> Vec3<f64> {
        self.basis * point + self.pos
    }

    /// Map a world point to local coordinates.
    pub fn inverse_transform(&self, point: Vec3<f64>) -> Vec3<f64> {
        self.basis.transposed() * (point - self.pos)
    }

    /// Map a world direction to local coordinates, ignoring the position.
    pub fn inverse_transform_direction(&self, direction: Vec3<f64>) -> Vec3<f64> {
        self.basis.transposed() * direction
    }
}

impl Default for Iso {
    fn default() -> Self {
        Self::identity()
    }
}

/// Rotation matrix for a unit quaternion.
///
/// Shoemake's construction, the columns are the rotated basis vectors.
pub fn rotation_matrix(q: Quaternion<f64>) -> Mat3<f64> {
    let Quaternion { x, y, z, w } = q;

    Mat3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        1.0 - 2.0 * (x * x + y * y),
    )
}

/// Normalize a quaternion to unit length.
///
/// Returns `None` when the norm is too small to divide by.
pub fn try_normalize(q: Quaternion<f64>) -> Option<Quaternion<f64>> {
    let norm = (q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
    if norm < MIN_NORMALIZABLE {
        return None;
    }

    let recip = norm.recip();

    Some(Quaternion {
        x: q.x * recip,
        y: q.y * recip,
        z: q.z * recip,
        w: q.w * recip,
    })
}

/// Integrate a quaternion by an angular velocity.
///
/// Adds `factor / 2 * (omega * q)` to the quaternion, where `omega` is
/// embedded as a pure imaginary quaternion and `*` is the Hamilton
/// product. The result is not normalized.
pub fn add_scaled(q: Quaternion<f64>, omega: Vec3<f64>, factor: f64) -> Quaternion<f64> {
    // Hamilton product of (0, omega) and q
    let dot_w = -omega.x * q.x - omega.y * q.y - omega.z * q.z;
    let dot_x = omega.x * q.w + omega.y * q.z - omega.z * q.y;
    let dot_y = omega.y * q.w + omega.z * q.x - omega.x * q.z;
    let dot_z = omega.z * q.w + omega.x * q.y - omega.y * q.x;

    let half = factor / 2.0;

    Quaternion {
        x: q.x + dot_x * half,
        y: q.y + dot_y * half,
        z: q.z + dot_z * half,
        w: q.w + dot_w * half,
    }
}

/// Skew-symmetric cross product matrix.
///
/// `skew(a) * b` equals `a.cross(b)`.
pub fn skew(v: Vec3<f64>) -> Mat3<f64> {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Invert a 3x3 matrix.
///
/// Returns `None` when the determinant vanishes.
pub fn try_invert(m: Mat3<f64>) -> Option<Mat3<f64>> {
    let det = m.determinant();
    if det == 0.0 {
        return None;
    }

    let c = m.cols;

    // Cofactor columns of the adjugate
    let r0 = c[1].cross(c[2]);
    let r1 = c[2].cross(c[0]);
    let r2 = c[0].cross(c[1]);

    let recip = det.recip();

    Some(Mat3::new(
        r0.x * recip,
        r0.y * recip,
        r0.z * recip,
        r1.x * recip,
        r1.y * recip,
        r1.z * recip,
        r2.x * recip,
        r2.y * recip,
        r2.z * recip,
    ))
}

/// Express a body-frame tensor in world coordinates.
///
/// Similarity transform `basis * tensor * basis^T`, used for the
/// inverse inertia tensor.
pub fn to_world_tensor(basis: Mat3<f64>, tensor: Mat3<f64>) -> Mat3<f64> {
    basis * tensor * basis.transposed()
}

/// Orthonormal basis at a contact point.
///
/// The first column is the normal, the other two span the tangent
/// plane. The normal is assumed to be unit length.
pub fn contact_basis(normal: Vec3<f64>) -> Mat3<f64> {
    let (tangent_y, tangent_z) = if normal.x.abs() > normal.y.abs() {
        // The normal points mostly along world X, build the first tangent in the XZ plane
        let scale = (normal.x * normal.x + normal.z * normal.z).sqrt().recip();
        let tangent_y = Vec3::new(normal.z * scale, 0.0, -normal.x * scale);

        (tangent_y, tangent_y.cross(normal).normalized())
    } else {
        let scale = (normal.y * normal.y + normal.z * normal.z).sqrt().recip();
        let tangent_y = Vec3::new(0.0, -normal.z * scale, normal.y * scale);

        (tangent_y, normal.cross(tangent_y).normalized())
    };

    Mat3 {
        cols: Vec3::new(normal, tangent_y, tangent_z),
    }
}

#[cfg(test)]
mod tests {
    use vek::{Mat3, Quaternion, Vec3};

    use super::{
        add_scaled, contact_basis, rotation_matrix, skew, to_world_tensor, try_invert,
        try_normalize, Iso,
    };

    fn random_unit_quaternion() -> Quaternion<f64> {
        let q = Quaternion {
            x: fastrand::f64() * 2.0 - 1.0,
            y: fastrand::f64() * 2.0 - 1.0,
            z: fastrand::f64() * 2.0 - 1.0,
            w: fastrand::f64() * 2.0 - 1.0,
        };

        try_normalize(q).unwrap_or_else(Quaternion::identity)
    }

    fn random_vec() -> Vec3<f64> {
        Vec3::new(
            fastrand::f64() * 20.0 - 10.0,
            fastrand::f64() * 20.0 - 10.0,
            fastrand::f64() * 20.0 - 10.0,
        )
    }

    /// Transforming a point there and back must return the original.
    #[test]
    fn test_transform_round_trip() {
        fastrand::seed(7);

        for _ in 0..100 {
            let iso = Iso::new(random_vec(), random_unit_quaternion());
            let point = random_vec();

            let round_trip = iso.inverse_transform(iso.transform(point));
            assert!((round_trip - point).magnitude() < 1e-12);
        }
    }

    #[test]
    fn test_rotation_matrix_is_orthonormal() {
        fastrand::seed(11);

        for _ in 0..100 {
            let basis = rotation_matrix(random_unit_quaternion());
            let product = basis * basis.transposed();

            for row in 0..3 {
                for col in 0..3 {
                    let expected = if row == col { 1.0 } else { 0.0 };
                    assert!((product.cols[col][row] - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_normalize_rejects_zero() {
        let zero = Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        };
        assert!(try_normalize(zero).is_none());

        let doubled = Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 2.0,
        };
        assert_eq!(try_normalize(doubled), Some(Quaternion::identity()));
    }

    #[test]
    fn test_skew_matches_cross_product() {
        fastrand::seed(13);

        for _ in 0..100 {
            let a = random_vec();
            let b = random_vec();

            let by_matrix = skew(a) * b;
            let by_cross = a.cross(b);
            assert!((by_matrix - by_cross).magnitude() < 1e-9);
        }
    }

    #[test]
    fn test_invert() {
        let singular = Mat3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 0.0);
        assert!(try_invert(singular).is_none());

        fastrand::seed(17);
        for _ in 0..100 {
            let basis = rotation_matrix(random_unit_quaternion());
            let inverse = try_invert(basis).unwrap();

            // The inverse of a rotation is its transpose
            let product = basis * inverse;
            for row in 0..3 {
                for col in 0..3 {
                    let expected = if row == col { 1.0 } else { 0.0 };
                    assert!((product.cols[col][row] - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_world_tensor_of_identity_basis() {
        let tensor = Mat3::new(2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0);

        assert_eq!(to_world_tensor(Mat3::identity(), tensor), tensor);
    }

    /// The contact basis must be orthonormal with the normal as first column.
    #[test]
    fn test_contact_basis() {
        fastrand::seed(19);

        for _ in 0..100 {
            let normal = random_vec().normalized();
            let basis = contact_basis(normal);

            assert!((basis.cols[0] - normal).magnitude() < 1e-12);
            for i in 0..3 {
                assert!((basis.cols[i].magnitude() - 1.0).abs() < 1e-9);
                for j in (i + 1)..3 {
                    assert!(basis.cols[i].dot(basis.cols[j]).abs() < 1e-9);
                }
            }
        }
    }

    /// Integrating with zero angular velocity must leave the quaternion untouched.
    #[test]
    fn test_add_scaled_zero_velocity() {
        fastrand::seed(23);

        let q = random_unit_quaternion();
        assert_eq!(add_scaled(q, Vec3::zero(), 0.01), q);
    }

    /// A small rotation around Y must match the closed form axis-angle result.
    #[test]
    fn test_add_scaled_small_rotation() {
        let omega = Vec3::new(0.0, 1.0, 0.0);
        let dt = 1e-4;

        let q = try_normalize(add_scaled(Quaternion::identity(), omega, dt)).unwrap();
        let angle = 2.0 * q.y.atan2(q.w);
        assert!((angle - dt).abs() < 1e-9);
    }
}
