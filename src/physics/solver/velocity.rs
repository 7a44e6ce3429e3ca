//! Impulse transfer between colliding bodies.

use arrayvec::ArrayVec;
use slotmap::SlotMap;
use vek::Vec3;

use crate::math;
use crate::physics::collision::{Contact, ContactRegistry};
use crate::physics::rigidbody::{RigidBody, RigidBodyKey};

use super::{angular_inertia, match_awake_state, update_desired_delta_velocity};

/// Velocity change of a single body caused by an impulse.
struct Jolt {
    /// The body that was jolted.
    body: RigidBodyKey,
    /// Linear velocity change.
    velocity: Vec3<f64>,
    /// Angular velocity change.
    rotation: Vec3<f64>,
}

/// Sequentially cancel closing velocities, worst contact first.
///
/// Every transferred impulse updates the closing velocity of all contacts
/// sharing one of the two bodies, including the resolved contact itself.
/// Stops when no contact wants more velocity change than `epsilon` or
/// when the iteration cap runs out.
pub fn solve(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    registry: &mut ContactRegistry,
    epsilon: f64,
    max_iterations: usize,
) {
    puffin::profile_function!();

    for _ in 0..max_iterations {
        // Worst contact first, on equal velocities the earliest wins
        let mut best_index = None;
        let mut best_velocity = epsilon;
        for (index, contact) in registry.contacts().iter().enumerate() {
            if contact.desired_delta_velocity > best_velocity {
                best_velocity = contact.desired_delta_velocity;
                best_index = Some(index);
            }
        }
        let Some(index) = best_index else {
            break;
        };

        match_awake_state(bodies, &registry.contacts()[index]);

        let contact = registry.contacts()[index].clone();
        match apply_impulse(bodies, &contact) {
            Some(jolts) => propagate_jolts(registry, &jolts),
            // Nothing can move, don't pick this contact again
            None => registry.contacts_mut()[index].desired_delta_velocity = 0.0,
        }
    }
}

/// Transfer the impulse that produces the desired velocity change.
///
/// Returns the velocity jolts of the affected bodies, or `None` when the
/// pair cannot respond to impulses.
fn apply_impulse(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    contact: &Contact,
) -> Option<ArrayVec<Jolt, 2>> {
    let a_key = contact.body_a?;

    let impulse_contact = if contact.friction == 0.0 {
        frictionless_impulse(bodies, contact)?
    } else {
        friction_impulse(bodies, contact)?
    };

    // To world coordinates and equal but opposite onto the pair
    let impulse = contact.basis * impulse_contact;

    let mut jolts = ArrayVec::new();

    let a = bodies.get_mut(a_key)?;
    let torque_impulse = contact.rel_a.cross(impulse);
    a.apply_impulse(impulse, torque_impulse);
    jolts.push(Jolt {
        body: a_key,
        velocity: impulse * a.inverse_mass(),
        rotation: *a.inverse_inertia_world() * torque_impulse,
    });

    if let Some(b_key) = contact.body_b {
        let b = bodies.get_mut(b_key)?;
        let torque_impulse = contact.rel_b.cross(impulse);
        b.apply_impulse(-impulse, -torque_impulse);
        jolts.push(Jolt {
            body: b_key,
            velocity: -impulse * b.inverse_mass(),
            rotation: *b.inverse_inertia_world() * -torque_impulse,
        });
    }

    Some(jolts)
}

/// Contact frame impulse for a contact without friction.
///
/// Only the normal component is needed, a one dimensional solve.
fn frictionless_impulse(
    bodies: &SlotMap<RigidBodyKey, RigidBody>,
    contact: &Contact,
) -> Option<Vec3<f64>> {
    let a = bodies.get(contact.body_a?)?;

    let mut delta_velocity = a.inverse_mass() + angular_inertia(a, contact.rel_a, contact.normal);
    if let Some(b) = contact.body_b.and_then(|key| bodies.get(key)) {
        delta_velocity += b.inverse_mass() + angular_inertia(b, contact.rel_b, contact.normal);
    }

    if delta_velocity <= 0.0 {
        return None;
    }

    Some(Vec3::new(
        contact.desired_delta_velocity / delta_velocity,
        0.0,
        0.0,
    ))
}

/// Contact frame impulse for a contact with friction.
///
/// Solves the full three dimensional response and projects the result
/// back onto the Coulomb cone when the planar impulse exceeds it.
fn friction_impulse(
    bodies: &SlotMap<RigidBodyKey, RigidBody>,
    contact: &Contact,
) -> Option<Vec3<f64>> {
    let a = bodies.get(contact.body_a?)?;
    let mut inverse_mass_sum = a.inverse_mass();

    // Velocity per unit impulse through rotation, -[r]x I^-1 [r]x
    let mut delta_velocity_world =
        math::skew(-contact.rel_a) * *a.inverse_inertia_world() * math::skew(contact.rel_a);

    if let Some(b) = contact.body_b.and_then(|key| bodies.get(key)) {
        delta_velocity_world = delta_velocity_world
            + math::skew(-contact.rel_b) * *b.inverse_inertia_world() * math::skew(contact.rel_b);
        inverse_mass_sum += b.inverse_mass();
    }

    // To contact coordinates, the linear response sits on the diagonal
    let mut delta_velocity = contact.basis.transposed() * delta_velocity_world * contact.basis;
    delta_velocity.cols[0][0] += inverse_mass_sum;
    delta_velocity.cols[1][1] += inverse_mass_sum;
    delta_velocity.cols[2][2] += inverse_mass_sum;

    let impulse_matrix = math::try_invert(delta_velocity)?;

    // Velocity to cancel: the bounce in the normal, all sliding in the plane
    let kill_velocity = Vec3::new(
        contact.desired_delta_velocity,
        -contact.contact_velocity.y,
        -contact.contact_velocity.z,
    );

    let mut impulse = impulse_matrix * kill_velocity;

    let planar = (impulse.y * impulse.y + impulse.z * impulse.z).sqrt();
    if planar > impulse.x * contact.friction {
        if planar <= 0.0 {
            return None;
        }

        // Outside the friction cone, slide along the planar direction
        impulse.y /= planar;
        impulse.z /= planar;

        let response = delta_velocity.cols[0][0]
            + delta_velocity.cols[1][0] * contact.friction * impulse.y
            + delta_velocity.cols[2][0] * contact.friction * impulse.z;
        if response <= 0.0 {
            return None;
        }

        impulse.x = contact.desired_delta_velocity / response;
        impulse.y *= contact.friction * impulse.x;
        impulse.z *= contact.friction * impulse.x;
    }

    Some(impulse)
}

/// Fold the velocity jolts into every contact touching a jolted body.
fn propagate_jolts(registry: &mut ContactRegistry, jolts: &[Jolt]) {
    for contact in registry.contacts_mut() {
        let mut changed = false;

        for jolt in jolts {
            if contact.body_a == Some(jolt.body) {
                let delta = jolt.velocity + jolt.rotation.cross(contact.rel_a);
                contact.contact_velocity += contact.basis.transposed() * delta;
                changed = true;
            }
            if contact.body_b == Some(jolt.body) {
                let delta = jolt.velocity + jolt.rotation.cross(contact.rel_b);
                contact.contact_velocity -= contact.basis.transposed() * delta;
                changed = true;
            }
        }

        if changed {
            update_desired_delta_velocity(contact);
        }
    }
}
