//! Position projection to remove residual interpenetration.
//!
//! A non-physical correction: after the impulses have fixed the
//! velocities the bodies may still overlap, so they are moved and rotated
//! apart directly, split by their inverse inertia.

use arrayvec::ArrayVec;
use slotmap::SlotMap;
use vek::Vec3;

use crate::physics::collision::{Contact, ContactRegistry};
use crate::physics::rigidbody::{RigidBody, RigidBodyKey};

use super::{angular_inertia, match_awake_state};

/// The angular part of a projection is clamped to this fraction of the
/// tangential arm to prevent large spurious rotations.
const ANGULAR_MOVE_LIMIT: f64 = 0.3;

/// Displacement of a single body caused by a projection.
struct Jolt {
    /// The body that was moved.
    body: RigidBodyKey,
    /// Position change.
    position: Vec3<f64>,
    /// Orientation change as a rotation vector.
    rotation: Vec3<f64>,
}

/// Sequentially project bodies apart, deepest contact first.
///
/// Every projection updates the penetration of all contacts sharing one
/// of the two bodies, including the resolved contact itself. Stops when
/// the deepest remaining penetration is below `epsilon` or when the
/// iteration cap runs out; residual overlap is accepted.
pub fn solve(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    registry: &mut ContactRegistry,
    epsilon: f64,
    relaxation: f64,
    max_iterations: usize,
) {
    puffin::profile_function!();

    for _ in 0..max_iterations {
        // Deepest contact first, on equal depth the earliest wins
        let mut best_index = None;
        let mut best_penetration = epsilon;
        for (index, contact) in registry.contacts().iter().enumerate() {
            if contact.penetration > best_penetration {
                best_penetration = contact.penetration;
                best_index = Some(index);
            }
        }
        let Some(index) = best_index else {
            break;
        };

        match_awake_state(bodies, &registry.contacts()[index]);

        let contact = registry.contacts()[index].clone();
        match project(bodies, &contact, relaxation) {
            Some(jolts) => update_penetrations(registry, &jolts),
            // Neither body can move, don't pick this contact again
            None => registry.contacts_mut()[index].penetration = 0.0,
        }
    }
}

/// Move and rotate the pair of a contact apart.
///
/// Returns the displacement jolts of the affected bodies, or `None` when
/// the pair has no inverse inertia to distribute.
fn project(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    contact: &Contact,
    relaxation: f64,
) -> Option<ArrayVec<Jolt, 2>> {
    let a_key = contact.body_a?;

    let a = bodies.get(a_key)?;
    let angular_a = angular_inertia(a, contact.rel_a, contact.normal);
    let mut total_inertia = a.inverse_mass() + angular_a;

    let angular_b = match contact.body_b.and_then(|key| bodies.get(key)) {
        Some(b) => {
            let angular_b = angular_inertia(b, contact.rel_b, contact.normal);
            total_inertia += b.inverse_mass() + angular_b;

            angular_b
        }
        None => 0.0,
    };

    if total_inertia <= 0.0 {
        return None;
    }

    let mut jolts = ArrayVec::new();

    // The pair splits the depth by inverse inertia, A forward and B backward
    jolts.push(project_body(
        bodies,
        a_key,
        contact,
        contact.rel_a,
        contact.penetration,
        angular_a,
        total_inertia,
        relaxation,
    )?);

    if let Some(b_key) = contact.body_b {
        jolts.push(project_body(
            bodies,
            b_key,
            contact,
            contact.rel_b,
            -contact.penetration,
            angular_b,
            total_inertia,
            relaxation,
        )?);
    }

    Some(jolts)
}

/// Apply the linear and angular share of one body's projection.
#[allow(clippy::too_many_arguments)]
fn project_body(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    key: RigidBodyKey,
    contact: &Contact,
    rel: Vec3<f64>,
    signed_penetration: f64,
    angular: f64,
    total_inertia: f64,
    relaxation: f64,
) -> Option<Jolt> {
    let body = bodies.get_mut(key)?;

    let mut penetration = signed_penetration;
    if relaxation > 0.0 && relaxation <= 1.0 {
        penetration *= 1.0 - relaxation;
    }

    let mut angular_move = penetration * (angular / total_inertia);
    let mut linear_move = penetration * (body.inverse_mass() / total_inertia);

    // Clamp the rotation share, the excess goes back into translation
    let tangential = rel - contact.normal * rel.dot(contact.normal);
    let limit = ANGULAR_MOVE_LIMIT * tangential.magnitude();
    if angular_move.abs() > limit {
        let total_move = angular_move + linear_move;
        angular_move = angular_move.clamp(-limit, limit);
        linear_move = total_move - angular_move;
    }

    let position_jolt = contact.normal * linear_move;
    body.apply_position_jolt(position_jolt);

    let mut rotation_jolt = Vec3::zero();
    if angular_move != 0.0 && angular > 0.0 {
        let direction = *body.inverse_inertia_world() * rel.cross(contact.normal);
        rotation_jolt = direction * (angular_move / angular);
        body.apply_orientation_jolt(rotation_jolt);
    }

    body.update_derived();

    Some(Jolt {
        body: key,
        position: position_jolt,
        rotation: rotation_jolt,
    })
}

/// Fold the displacement jolts into every contact touching a moved body.
fn update_penetrations(registry: &mut ContactRegistry, jolts: &[Jolt]) {
    for contact in registry.contacts_mut() {
        for jolt in jolts {
            if contact.body_a == Some(jolt.body) {
                let delta = jolt.position + jolt.rotation.cross(contact.rel_a);
                contact.penetration -= delta.dot(contact.normal);
            }
            if contact.body_b == Some(jolt.body) {
                let delta = jolt.position + jolt.rotation.cross(contact.rel_b);
                contact.penetration += delta.dot(contact.normal);
            }
        }
    }
}
