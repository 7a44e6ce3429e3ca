//! Narrow phase detectors for the primitive shape pairs.
//!
//! Every detector writes contacts straight into the registry and returns
//! the amount it registered. Contact normals point in the direction the
//! first body has to move to resolve the overlap.

use vek::Vec3;

use super::{Contact, ContactRegistry, Placed};

/// Box axes closer to perpendicular than this to the plane normal count
/// as parallel.
const PARALLEL_EPSILON: f64 = 1e-4;

/// Corner signs of a cuboid.
const CORNERS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, -1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, 1.0, 1.0],
];

/// Sphere against the boundary of a half-space.
pub(super) fn sphere_half_space(
    registry: &mut ContactRegistry,
    sphere: &Placed,
    radius: f64,
    normal: Vec3<f64>,
    offset: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    let center = sphere.iso.pos;

    let distance = normal.dot(center) - radius - offset;
    if distance >= 0.0 {
        return 0;
    }

    let point = center - normal * (distance + radius);
    let contact = Contact::new(
        sphere.body,
        None,
        point,
        normal,
        -distance,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Sphere against a two-sided plane.
pub(super) fn sphere_plane(
    registry: &mut ContactRegistry,
    sphere: &Placed,
    radius: f64,
    normal: Vec3<f64>,
    offset: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    let center = sphere.iso.pos;

    let distance = normal.dot(center) - offset;
    if distance * distance > radius * radius {
        return 0;
    }

    // Push the sphere out of whichever side it touches
    let (contact_normal, penetration) = if distance < 0.0 {
        (-normal, radius + distance)
    } else {
        (normal, radius - distance)
    };

    let point = center - normal * distance;
    let contact = Contact::new(
        sphere.body,
        None,
        point,
        contact_normal,
        penetration,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Sphere against sphere.
pub(super) fn sphere_sphere(
    registry: &mut ContactRegistry,
    a: &Placed,
    a_radius: f64,
    b: &Placed,
    b_radius: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    let delta = a.iso.pos - b.iso.pos;
    let distance = delta.magnitude();

    if distance <= 0.0 || distance >= a_radius + b_radius {
        return 0;
    }

    let contact = Contact::new(
        a.body,
        b.body,
        b.iso.pos + delta / 2.0,
        delta / distance,
        a_radius + b_radius - distance,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Cuboid against sphere.
pub(super) fn cuboid_sphere(
    registry: &mut ContactRegistry,
    cuboid: &Placed,
    half: Vec3<f64>,
    sphere: &Placed,
    radius: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    // Work in the cuboid's body frame
    let center = cuboid.iso.inverse_transform(sphere.iso.pos);

    if center.x.abs() > half.x + radius
        || center.y.abs() > half.y + radius
        || center.z.abs() > half.z + radius
    {
        return 0;
    }

    // Closest point on the box to the sphere center
    let closest = Vec3::new(
        center.x.clamp(-half.x, half.x),
        center.y.clamp(-half.y, half.y),
        center.z.clamp(-half.z, half.z),
    );

    let distance_sq = (closest - center).magnitude_squared();
    if distance_sq > radius * radius || distance_sq <= 0.0 {
        return 0;
    }

    let closest_world = cuboid.iso.transform(closest);
    let distance = distance_sq.sqrt();

    let contact = Contact::new(
        cuboid.body,
        sphere.body,
        closest_world,
        (closest_world - sphere.iso.pos) / distance,
        radius - distance,
        restitution,
        friction,
    );

    usize::from(registry.push(contact))
}

/// Cuboid against the boundary of a half-space.
///
/// When a box face or edge lies parallel to the plane a single contact is
/// synthesized at the midpoint of the deepest feature; otherwise every
/// penetrating vertex yields its own contact. The switch at the parallel
/// cutoff is intentionally discontinuous.
pub(super) fn cuboid_half_space(
    registry: &mut ContactRegistry,
    cuboid: &Placed,
    half: Vec3<f64>,
    normal: Vec3<f64>,
    offset: f64,
    restitution: f64,
    friction: f64,
) -> usize {
    // Quick rejection against the projected extent of the box
    let projection = half.x * cuboid.iso.axis(0).dot(normal).abs()
        + half.y * cuboid.iso.axis(1).dot(normal).abs()
        + half.z * cuboid.iso.axis(2).dot(normal).abs();
    if normal.dot(cuboid.iso.pos) - projection >= offset {
        return 0;
    }

    let alignments = [
        cuboid.iso.axis(0).dot(normal),
        cuboid.iso.axis(1).dot(normal),
        cuboid.iso.axis(2).dot(normal),
    ];

    if alignments
        .iter()
        .any(|alignment| alignment.abs() < PARALLEL_EPSILON)
    {
        // A face or edge is flush with the plane, one contact at the
        // midpoint of the deepest feature carries the whole response
        let mut local = Vec3::zero();
        for (i, alignment) in alignments.iter().enumerate() {
            if alignment.abs() >= PARALLEL_EPSILON {
                local[i] = if *alignment > 0.0 { -half[i] } else { half[i] };
            }
        }

        let point = cuboid.iso.transform(local);
        let penetration = (offset - point.dot(normal)).max(0.0);

        let contact = Contact::new(
            cuboid.body,
            None,
            point,
            normal,
            penetration,
            restitution,
            friction,
        );

        return usize::from(registry.push(contact));
    }

    // One contact per vertex inside the half-space
    let mut count = 0;
    for corner in CORNERS {
        let vertex = cuboid.iso.transform(Vec3::new(
            corner[0] * half.x,
            corner[1] * half.y,
            corner[2] * half.z,
        ));

        let penetration = offset - vertex.dot(normal);
        if penetration < 0.0 {
            continue;
        }

        let contact = Contact::new(
            cuboid.body,
            None,
            vertex + normal * (penetration / 2.0),
            normal,
            penetration,
            restitution,
            friction,
        );
        if !registry.push(contact) {
            break;
        }

        count += 1;
    }

    count
}
