//! Iterative contact resolution.
//!
//! Runs after detection in two passes: impulse transfer cancels closing
//! velocities so bodies bounce, position projection removes the
//! interpenetration the impulses leave behind. Both passes are strictly
//! sequential and always pick the worst remaining contact first.

pub mod projection;
pub mod velocity;

use slotmap::SlotMap;
use vek::Vec3;

use crate::math;

use super::collision::{Contact, ContactRegistry};
use super::rigidbody::{RigidBody, RigidBodyKey};

/// Contacts closing slower than this relative velocity don't bounce.
///
/// Restitution on crawling contacts only adds vibration to resting
/// bodies.
const RESTITUTION_VELOCITY_LIMIT: f64 = 0.25;

/// Refresh the derived data of every contact in the registry.
///
/// Also normalizes contacts that were detected with the scenery first so
/// the first body is always present afterwards.
pub fn prepare_contacts(
    registry: &mut ContactRegistry,
    bodies: &SlotMap<RigidBodyKey, RigidBody>,
    dt: f64,
) {
    puffin::profile_function!();

    for contact in registry.contacts_mut() {
        if contact.body_a.is_none() {
            contact.body_a = contact.body_b.take();
            contact.normal = -contact.normal;
        }

        update_derived(contact, bodies, dt);
    }
}

/// Compute the contact basis, relative positions and closing velocity.
fn update_derived(contact: &mut Contact, bodies: &SlotMap<RigidBodyKey, RigidBody>, dt: f64) {
    let Some(a) = contact.body_a.and_then(|key| bodies.get(key)) else {
        return;
    };

    contact.basis = math::contact_basis(contact.normal);
    contact.rel_a = contact.point - a.position();

    let mut velocity = a.velocity() + a.angular_velocity().cross(contact.rel_a);
    let mut acc_velocity = a.force() * a.inverse_mass() * dt;

    if let Some(b) = contact.body_b.and_then(|key| bodies.get(key)) {
        contact.rel_b = contact.point - b.position();
        velocity -= b.velocity() + b.angular_velocity().cross(contact.rel_b);
        acc_velocity -= b.force() * b.inverse_mass() * dt;
    }

    // Only the planar part of the force-induced velocity joins the closing
    // velocity, the normal part feeds the restitution guard
    let mut acc_contact = contact.basis.transposed() * acc_velocity;
    contact.acc_normal_velocity = acc_contact.x;
    acc_contact.x = 0.0;

    contact.contact_velocity = contact.basis.transposed() * velocity + acc_contact;

    update_desired_delta_velocity(contact);
}

/// Recompute the bouncing velocity from the closing velocity.
pub(super) fn update_desired_delta_velocity(contact: &mut Contact) {
    let closing = contact.contact_velocity.x;

    let restitution = if (closing - contact.acc_normal_velocity).abs() < RESTITUTION_VELOCITY_LIMIT
    {
        0.0
    } else {
        contact.restitution
    };

    contact.desired_delta_velocity =
        -(1.0 + restitution) * closing + restitution * contact.acc_normal_velocity;
}

/// Normal velocity a unit impulse at the contact point generates through
/// rotation of the body.
pub(super) fn angular_inertia(body: &RigidBody, rel: Vec3<f64>, normal: Vec3<f64>) -> f64 {
    let rotation_per_unit = *body.inverse_inertia_world() * rel.cross(normal);

    rotation_per_unit.cross(rel).dot(normal)
}

/// Wake the sleeping half of a body pair in contact.
///
/// Resting contacts between two sleeping bodies are left alone.
pub(super) fn match_awake_state(
    bodies: &mut SlotMap<RigidBodyKey, RigidBody>,
    contact: &Contact,
) {
    let (Some(a_key), Some(b_key)) = (contact.body_a, contact.body_b) else {
        return;
    };

    let a_active = bodies.get(a_key).is_some_and(RigidBody::is_active);
    let b_active = bodies.get(b_key).is_some_and(RigidBody::is_active);

    if a_active != b_active {
        let sleeping = if a_active { b_key } else { a_key };
        if let Some(body) = bodies.get_mut(sleeping) {
            body.activate();
        }
    }
}
