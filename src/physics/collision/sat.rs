//! Separating axis theorem for cuboid pairs.
//!
//! Two convex shapes are disjoint iff some axis separates their
//! projections. For a pair of cuboids the 15 candidates are the three
//! face axes of each box and the nine cross products between them. The
//! axis with the smallest positive penetration determines the contact.

use vek::Vec3;

use crate::math::Iso;

use super::{Contact, ContactRegistry, Placed};

/// Cross product axes with a squared norm below this are skipped as
/// nearly parallel; the same cutoff decides when an edge coordinate
/// degenerates to its midpoint.
const PARALLEL_EPSILON: f64 = 1e-4;

/// Below this denominator the two edges are parallel and the closest
/// point formula breaks down.
const DEGENERATE_DENOMINATOR: f64 = 1e-4;

/// Cuboid against cuboid.
///
/// Registers at most one contact: a vertex-face contact when a face axis
/// wins, an edge-edge contact when a cross product axis wins.
pub(super) fn cuboid_cuboid(
    registry: &mut ContactRegistry,
    a: &Placed,
    a_half: Vec3<f64>,
    b: &Placed,
    b_half: Vec3<f64>,
    restitution: f64,
    friction: f64,
) -> usize {
    let to_centre = b.iso.pos - a.iso.pos;

    let mut best_penetration = f64::MAX;
    let mut best_axis = usize::MAX;

    // The six face axes come first so ties prefer them over edge cases
    for index in 0..6 {
        let axis = if index < 3 {
            a.iso.axis(index)
        } else {
            b.iso.axis(index - 3)
        };

        let penetration = penetration_on_axis(a, a_half, b, b_half, axis, to_centre);
        if penetration < 0.0 {
            return 0;
        }
        if penetration < best_penetration {
            best_penetration = penetration;
            best_axis = index;
        }
    }

    // Remember the best face axis for resolving degenerate edge contacts
    let best_single_axis = best_axis;

    for i in 0..3 {
        for j in 0..3 {
            let cross = a.iso.axis(i).cross(b.iso.axis(j));
            if cross.magnitude_squared() < PARALLEL_EPSILON {
                continue;
            }

            let axis = cross.normalized();
            let penetration = penetration_on_axis(a, a_half, b, b_half, axis, to_centre);
            if penetration < 0.0 {
                return 0;
            }
            if penetration < best_penetration {
                best_penetration = penetration;
                best_axis = 6 + i * 3 + j;
            }
        }
    }

    if best_axis < 3 {
        // Vertex of B against a face of A
        point_face_contact(
            registry,
            a,
            b,
            b_half,
            to_centre,
            best_axis,
            best_penetration,
            restitution,
            friction,
        )
    } else if best_axis < 6 {
        // Vertex of A against a face of B, same with the pair swapped
        point_face_contact(
            registry,
            b,
            a,
            a_half,
            -to_centre,
            best_axis - 3,
            best_penetration,
            restitution,
            friction,
        )
    } else {
        edge_edge_contact(
            registry,
            a,
            a_half,
            b,
            b_half,
            to_centre,
            best_axis - 6,
            best_single_axis,
            best_penetration,
            restitution,
            friction,
        )
    }
}

/// Overlap of the two projected cuboids on a unit axis.
///
/// Positive means the projections overlap by that amount.
fn penetration_on_axis(
    a: &Placed,
    a_half: Vec3<f64>,
    b: &Placed,
    b_half: Vec3<f64>,
    axis: Vec3<f64>,
    to_centre: Vec3<f64>,
) -> f64 {
    project_onto(a_half, &a.iso, axis) + project_onto(b_half, &b.iso, axis)
        - to_centre.dot(axis).abs()
}

/// Half-length of a cuboid's projection on a unit axis.
fn project_onto(half: Vec3<f64>, iso: &Iso, axis: Vec3<f64>) -> f64 {
    half.x * iso.axis(0).dot(axis).abs()
        + half.y * iso.axis(1).dot(axis).abs()
        + half.z * iso.axis(2).dot(axis).abs()
}

/// Register the contact for a vertex of `vertex_owner` touching a face of
/// `face_owner`.
#[allow(clippy::too_many_arguments)]
fn point_face_contact(
    registry: &mut ContactRegistry,
    face_owner: &Placed,
    vertex_owner: &Placed,
    vertex_half: Vec3<f64>,
    to_centre: Vec3<f64>,
    axis_index: usize,
    penetration: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    // Point the face normal away from the other body
    let mut normal = face_owner.iso.axis(axis_index);
    if normal.dot(to_centre) > 0.0 {
        normal = -normal;
    }

    // The penetrating vertex has its coordinate signs opposite to the normal
    let mut vertex = vertex_half;
    for i in 0..3 {
        if vertex_owner.iso.axis(i).dot(normal) < 0.0 {
            vertex[i] = -vertex[i];
        }
    }

    let contact = Contact::new(
        face_owner.body,
        vertex_owner.body,
        vertex_owner.iso.transform(vertex),
        normal,
        penetration,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Register the contact between an edge of each cuboid.
#[allow(clippy::too_many_arguments)]
fn edge_edge_contact(
    registry: &mut ContactRegistry,
    a: &Placed,
    a_half: Vec3<f64>,
    b: &Placed,
    b_half: Vec3<f64>,
    to_centre: Vec3<f64>,
    cross_index: usize,
    best_single_axis: usize,
    penetration: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    let a_index = cross_index / 3;
    let b_index = cross_index % 3;

    let mut normal = a.iso.axis(a_index).cross(b.iso.axis(b_index)).normalized();
    if normal.dot(to_centre) > 0.0 {
        normal = -normal;
    }

    // Midpoint of the edge on each body closest to the other body; axes
    // nearly perpendicular to the normal keep the midpoint coordinate
    let mut point_on_a = a_half;
    let mut point_on_b = b_half;
    for i in 0..3 {
        if i == a_index {
            point_on_a[i] = 0.0;
        } else {
            let alignment = a.iso.axis(i).dot(normal);
            if alignment.abs() < PARALLEL_EPSILON {
                point_on_a[i] = 0.0;
            } else if alignment > 0.0 {
                point_on_a[i] = -point_on_a[i];
            }
        }

        if i == b_index {
            point_on_b[i] = 0.0;
        } else {
            let alignment = b.iso.axis(i).dot(normal);
            if alignment.abs() < PARALLEL_EPSILON {
                point_on_b[i] = 0.0;
            } else if alignment < 0.0 {
                point_on_b[i] = -point_on_b[i];
            }
        }
    }

    let point = closest_point_between_edges(
        a.iso.transform(point_on_a),
        a.iso.axis(a_index),
        a_half[a_index],
        b.iso.transform(point_on_b),
        b.iso.axis(b_index),
        b_half[b_index],
        // On a degenerate closest point keep the edge of the body whose
        // face axis lost to the cross product
        best_single_axis > 2,
    );

    let contact = Contact::new(
        a.body,
        b.body,
        point,
        normal,
        penetration,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Closest approach of two edge segments.
///
/// Each edge is a midpoint, a unit direction and a half-length. When the
/// closest point parameter leaves either segment the contact degenerates
/// to edge-face and the midpoint of the preferred body's edge is used.
fn closest_point_between_edges(
    point_a: Vec3<f64>,
    dir_a: Vec3<f64>,
    half_a: f64,
    point_b: Vec3<f64>,
    dir_b: Vec3<f64>,
    half_b: f64,
    use_a: bool,
) -> Vec3<f64> {
    let len_sq_a = dir_a.magnitude_squared();
    let len_sq_b = dir_b.magnitude_squared();
    let dot_ab = dir_b.dot(dir_a);

    let to_start = point_a - point_b;
    let along_a = dir_a.dot(to_start);
    let along_b = dir_b.dot(to_start);

    let denominator = len_sq_a * len_sq_b - dot_ab * dot_ab;
    if denominator.abs() < DEGENERATE_DENOMINATOR {
        return if use_a { point_a } else { point_b };
    }

    let parameter_a = (dot_ab * along_b - len_sq_b * along_a) / denominator;
    let parameter_b = (len_sq_a * along_b - dot_ab * along_a) / denominator;

    if parameter_a.abs() > half_a || parameter_b.abs() > half_b {
        if use_a {
            point_a
        } else {
            point_b
        }
    } else {
        let on_a = point_a + dir_a * parameter_a;
        let on_b = point_b + dir_b * parameter_b;

        (on_a + on_b) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use vek::{Quaternion, Vec3};

    use crate::math::Iso;
    use crate::physics::collision::{detect, ContactRegistry, Placed};
    use crate::physics::geometry::Shape;

    fn unit_cube(pos: Vec3<f64>, orientation: Quaternion<f64>) -> Placed {
        Placed {
            shape: Shape::Cuboid {
                half: Vec3::new(0.5, 0.5, 0.5),
            },
            iso: Iso::new(pos, orientation),
            body: None,
        }
    }

    /// Two axis-aligned cubes overlapping at a corner yield exactly one
    /// contact with the overlap depth.
    #[test]
    fn test_corner_overlap() {
        let mut registry = ContactRegistry::new(8);

        let a = unit_cube(Vec3::zero(), Quaternion::identity());
        let b = unit_cube(Vec3::new(0.9, 0.9, 0.9), Quaternion::identity());

        assert_eq!(detect(&mut registry, &a, &b, 1.0, 0.0), 1);

        let contact = &registry.contacts()[0];
        assert!((contact.penetration - 0.1).abs() < 0.01);

        // With every face axis tied the first one wins deterministically,
        // the normal is a face axis pushing A away from B
        assert!((contact.normal.magnitude() - 1.0).abs() < 1e-12);
        assert!(contact.normal.dot(Vec3::new(1.0, 1.0, 1.0)) < 0.0);
        let largest = contact
            .normal
            .map(f64::abs)
            .reduce_partial_max();
        assert!((largest - 1.0).abs() < 1e-12);
    }

    /// Separated cubes produce no contact.
    #[test]
    fn test_separated() {
        let mut registry = ContactRegistry::new(8);

        let a = unit_cube(Vec3::zero(), Quaternion::identity());
        let b = unit_cube(Vec3::new(1.1, 0.0, 0.0), Quaternion::identity());

        assert_eq!(detect(&mut registry, &a, &b, 1.0, 0.0), 0);

        // Diagonal separation is also found by the face axes
        let c = unit_cube(Vec3::new(1.1, 1.1, 1.1), Quaternion::identity());
        assert_eq!(detect(&mut registry, &a, &c, 1.0, 0.0), 0);
    }

    /// A cube rotated 45 degrees resting its vertex on a face of the
    /// other yields a vertex-face contact along the face normal.
    #[test]
    fn test_vertex_face() {
        let mut registry = ContactRegistry::new(8);

        let a = unit_cube(Vec3::zero(), Quaternion::identity());
        // Tilt 45 degrees around X and atan(1/sqrt(2)) around Z so a corner
        // points straight down, the half diagonal is sqrt(3)/2
        let rotation = Quaternion::rotation_3d(0.6154797086703873, Vec3::unit_z())
            * Quaternion::rotation_3d(std::f64::consts::FRAC_PI_4, Vec3::unit_x());
        let b = unit_cube(Vec3::new(0.0, 1.3, 0.0), rotation);

        let count = detect(&mut registry, &a, &b, 1.0, 0.0);
        assert_eq!(count, 1);

        let contact = &registry.contacts()[0];
        // A is pushed down, away from B
        assert!(contact.normal.y < -0.9);
        // Overlap of the corner with the top face of A
        assert!((contact.penetration - (0.5 + 0.75f64.sqrt() - 1.3)).abs() < 1e-9);
        // The contact sits at B's lowest corner
        assert!((contact.point - Vec3::new(0.0, 1.3 - 0.75f64.sqrt(), 0.0)).magnitude() < 1e-9);
    }

    /// Two cubes rotated 45 degrees around different axes crossing at
    /// their edges yield an edge-edge contact.
    #[test]
    fn test_edge_edge() {
        let mut registry = ContactRegistry::new(8);

        // A's top edge runs along Z, B's bottom edge along X
        let a = unit_cube(
            Vec3::zero(),
            Quaternion::rotation_3d(std::f64::consts::FRAC_PI_4, Vec3::unit_z()),
        );
        let b = unit_cube(
            Vec3::new(0.0, 1.3, 0.0),
            Quaternion::rotation_3d(std::f64::consts::FRAC_PI_4, Vec3::unit_x()),
        );

        // Edge tips meet at sqrt(2)/2 from each center
        let count = detect(&mut registry, &a, &b, 1.0, 0.0);
        assert_eq!(count, 1);

        let contact = &registry.contacts()[0];
        assert!((contact.penetration - (std::f64::consts::SQRT_2 - 1.3)).abs() < 1e-9);
        // The separating direction is vertical
        assert!(contact.normal.y < -0.9);
        // The crossing happens between the two edges
        assert!(contact.point.x.abs() < 1e-9);
        assert!(contact.point.z.abs() < 1e-9);
        assert!((contact.point.y - 1.3 / 2.0).abs() < 0.2);
    }
}
