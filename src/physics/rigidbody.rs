use std::fmt::Display;

use slotmap::new_key_type;
use vek::{Mat3, Quaternion, Vec3};

use crate::math::{self, Iso};

/// Masses at or above this are treated as infinite.
pub const MAX_FINITE_MASS: f64 = 1e30;

/// Kinetic energy threshold for falling asleep, as a fraction of the mass.
const SLEEP_ENERGY_FACTOR: f64 = 0.3;

/// Filtered kinetic energy a body wakes up with, as a fraction of the mass.
///
/// Twice the sleep threshold so a woken body is not immediately put back
/// to sleep by the filter.
const WAKE_ENERGY_FACTOR: f64 = 0.6;

/// The filtered kinetic energy is clamped at this multiple of the sleep
/// threshold so a long flight doesn't delay falling asleep afterwards.
const SLEEP_CLAMP_MULTIPLIER: f64 = 10.0;

new_key_type! {
    /// Handle of a rigid body inside the world.
    pub struct RigidBodyKey;
}

/// Represents any physics object that forces and impulses can be applied to.
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// Inverse of the mass.
    ///
    /// Zero means the body is immovable.
    inv_mass: f64,
    /// Inverse inertia tensor in the body frame.
    inv_inertia_body: Mat3<f64>,
    /// Global position of the center of mass.
    pos: Vec3<f64>,
    /// Orientation, kept unit length after every step.
    orientation: Quaternion<f64>,
    /// Linear momentum.
    momentum: Vec3<f64>,
    /// Angular momentum around the center of mass.
    angular_momentum: Vec3<f64>,
    /// Accumulated force for the current step.
    force: Vec3<f64>,
    /// Accumulated torque for the current step.
    torque: Vec3<f64>,
    /// Accumulated potential energy of the applied external forces.
    potential: f64,
    /// World transform, derived from the position and orientation.
    transform: Iso,
    /// Inverse inertia tensor in world coordinates.
    inv_inertia_world: Mat3<f64>,
    /// Linear velocity, derived from the momentum.
    vel: Vec3<f64>,
    /// Angular velocity, derived from the angular momentum.
    ang_vel: Vec3<f64>,
    /// Total angular momentum around the world origin.
    total_angular_momentum: Vec3<f64>,
    /// Kinetic energy.
    kinetic: f64,
    /// Low-pass filtered kinetic energy driving deactivation.
    average_kinetic: f64,
    /// Whether the body takes part in integration and resolution.
    active: bool,
    /// Whether the body is allowed to fall asleep on its own.
    can_deactivate: bool,
    /// Whether momentum damping is applied during integration.
    damping: bool,
    /// Linear damping factor per second, zero leaves the momentum untouched.
    lin_damping: f64,
    /// Angular damping factor per second.
    ang_damping: f64,
}

impl RigidBody {
    /// Construct a unit mass body resting at the world origin.
    pub fn new(lin_damping: f64, ang_damping: f64) -> Self {
        let inv_mass = 1.0;
        let inv_inertia_body = Mat3::identity();
        let pos = Vec3::zero();
        let orientation = Quaternion::identity();
        let momentum = Vec3::zero();
        let angular_momentum = Vec3::zero();
        let force = Vec3::zero();
        let torque = Vec3::zero();
        let potential = 0.0;
        let transform = Iso::identity();
        let inv_inertia_world = inv_inertia_body;
        let vel = Vec3::zero();
        let ang_vel = Vec3::zero();
        let total_angular_momentum = Vec3::zero();
        let kinetic = 0.0;
        let average_kinetic = WAKE_ENERGY_FACTOR;
        let active = true;
        let can_deactivate = false;
        let damping = true;

        Self {
            inv_mass,
            inv_inertia_body,
            pos,
            orientation,
            momentum,
            angular_momentum,
            force,
            torque,
            potential,
            transform,
            inv_inertia_world,
            vel,
            ang_vel,
            total_angular_momentum,
            kinetic,
            average_kinetic,
            active,
            can_deactivate,
            damping,
            lin_damping,
            ang_damping,
        }
    }

    /// Set the mass together with the body frame inertia tensor.
    ///
    /// A mass of zero or above [`MAX_FINITE_MASS`] makes the body
    /// immovable. Returns `false` when the inertia tensor is singular, in
    /// which case the inverse is set to zero and the body cannot rotate.
    pub fn set_mass_properties(&mut self, mass: f64, inertia: Mat3<f64>) -> bool {
        if mass <= 0.0 || mass >= MAX_FINITE_MASS {
            self.inv_mass = 0.0;
            self.inv_inertia_body = Mat3::zero();
            self.update_derived();

            return true;
        }

        self.inv_mass = mass.recip();

        let invertible = match math::try_invert(inertia) {
            Some(inverse) => {
                self.inv_inertia_body = inverse;
                true
            }
            None => {
                self.inv_inertia_body = Mat3::zero();
                false
            }
        };

        self.update_derived();

        invertible
    }

    /// Set the initial state from a position, orientation and velocities.
    ///
    /// Momenta and all derived quantities are computed from the
    /// velocities. Returns `false` when the orientation cannot be
    /// normalized, in which case it defaults to identity.
    pub fn set_state(
        &mut self,
        pos: Vec3<f64>,
        orientation: Quaternion<f64>,
        vel: Vec3<f64>,
        ang_vel: Vec3<f64>,
    ) -> bool {
        let (orientation, normalizable) = match math::try_normalize(orientation) {
            Some(unit) => (unit, true),
            None => (Quaternion::identity(), false),
        };

        self.pos = pos;
        self.orientation = orientation;
        self.transform = Iso::new(pos, orientation);
        self.inv_inertia_world =
            math::to_world_tensor(self.transform.basis, self.inv_inertia_body);

        self.momentum = if self.inv_mass > 0.0 {
            vel / self.inv_mass
        } else {
            Vec3::zero()
        };
        self.angular_momentum = match math::try_invert(self.inv_inertia_world) {
            Some(inertia_world) => inertia_world * ang_vel,
            None => Vec3::zero(),
        };

        self.update_derived();
        self.average_kinetic = WAKE_ENERGY_FACTOR * self.mass_or_zero();

        normalizable
    }

    /// Perform a single semi-implicit Euler step.
    pub fn integrate(&mut self, dt: f64) {
        if !self.active || self.inv_mass == 0.0 {
            return;
        }

        // Momentum update from the accumulated force and torque
        self.momentum += self.force * dt;
        self.angular_momentum += self.torque * dt;

        // Apply damping if applicable, a factor of zero leaves the momentum untouched
        if self.damping {
            if self.lin_damping > 0.0 {
                self.momentum *= self.lin_damping.powf(dt);
            }
            if self.ang_damping > 0.0 {
                self.angular_momentum *= self.ang_damping.powf(dt);
            }
        }

        // New velocities move the state, which makes the scheme symplectic
        self.vel = self.momentum * self.inv_mass;
        self.ang_vel = self.inv_inertia_world * self.angular_momentum;

        self.pos += self.vel * dt;
        self.orientation = math::add_scaled(self.orientation, self.ang_vel, dt);

        self.update_derived();

        if self.can_deactivate {
            self.update_sleep_filter(dt);
        }
    }

    /// Recompute every derived quantity from the state.
    ///
    /// Normalizes the orientation, rebuilds the world transform and the
    /// world inverse inertia, and refreshes velocities, total angular
    /// momentum and kinetic energy.
    pub fn update_derived(&mut self) {
        self.orientation =
            math::try_normalize(self.orientation).unwrap_or_else(Quaternion::identity);
        self.transform = Iso::new(self.pos, self.orientation);
        self.inv_inertia_world =
            math::to_world_tensor(self.transform.basis, self.inv_inertia_body);

        self.vel = self.momentum * self.inv_mass;
        self.ang_vel = self.inv_inertia_world * self.angular_momentum;
        self.total_angular_momentum = self.pos.cross(self.momentum) + self.angular_momentum;
        self.kinetic =
            (self.vel.dot(self.momentum) + self.ang_vel.dot(self.angular_momentum)) / 2.0;
    }

    /// Update the filtered kinetic energy and fall asleep below the threshold.
    fn update_sleep_filter(&mut self, dt: f64) {
        let threshold = SLEEP_ENERGY_FACTOR * self.mass_or_zero();
        if threshold <= 0.0 {
            return;
        }

        let alpha = 0.5f64.powf(dt);
        self.average_kinetic = alpha * self.average_kinetic + (1.0 - alpha) * self.kinetic;

        let clamp = SLEEP_CLAMP_MULTIPLIER * threshold;
        if self.average_kinetic > clamp {
            self.average_kinetic = clamp;
        }

        if self.average_kinetic < threshold {
            self.deactivate();
        }
    }

    /// Wake the body up.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }

        self.active = true;
        self.average_kinetic = WAKE_ENERGY_FACTOR * self.mass_or_zero();
    }

    /// Put the body to sleep, zeroing all motion.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.momentum = Vec3::zero();
        self.angular_momentum = Vec3::zero();
        self.vel = Vec3::zero();
        self.ang_vel = Vec3::zero();
        self.force = Vec3::zero();
        self.torque = Vec3::zero();
        self.total_angular_momentum = Vec3::zero();
        self.kinetic = 0.0;
    }

    /// Apply an external force such as gravity at the center of mass.
    ///
    /// Accumulates the potential energy of the force and does not wake a
    /// sleeping body.
    pub fn add_external_force(&mut self, force: Vec3<f64>) {
        if !self.active {
            return;
        }

        self.force += force;
        self.potential += -force.dot(self.pos);
    }

    /// Apply an internal force at the center of mass, waking the body.
    pub fn add_force(&mut self, force: Vec3<f64>) {
        self.activate();
        self.force += force;
        self.potential += -force.dot(self.pos);
    }

    /// Apply a force at a world point, waking the body.
    ///
    /// The part of the force not aligned with the center of mass becomes
    /// torque.
    pub fn add_force_at_point(&mut self, force: Vec3<f64>, point: Vec3<f64>) {
        self.activate();
        self.force += force;
        self.torque += (point - self.pos).cross(force);
    }

    /// Apply a force at a point given in the body frame, waking the body.
    pub fn add_force_at_body_point(&mut self, force: Vec3<f64>, point: Vec3<f64>) {
        let world_point = self.transform.transform(point);
        self.add_force_at_point(force, world_point);
    }

    /// Apply an impulse and the torque impulse it causes.
    ///
    /// Velocities are refreshed from the changed momenta.
    pub fn apply_impulse(&mut self, impulse: Vec3<f64>, torque_impulse: Vec3<f64>) {
        self.momentum += impulse;
        self.angular_momentum += torque_impulse;
        self.vel = self.momentum * self.inv_mass;
        self.ang_vel = self.inv_inertia_world * self.angular_momentum;
    }

    /// Displace the position without touching the momenta.
    pub fn apply_position_jolt(&mut self, delta: Vec3<f64>) {
        self.pos += delta;
    }

    /// Rotate the orientation by a small angular displacement.
    pub fn apply_orientation_jolt(&mut self, omega: Vec3<f64>) {
        self.orientation = math::add_scaled(self.orientation, omega, 1.0);
    }

    /// Reset the accumulated force, torque and potential energy.
    pub fn clear_accumulators(&mut self) {
        self.force = Vec3::zero();
        self.torque = Vec3::zero();
        self.potential = 0.0;
    }

    /// Global position of the center of mass.
    pub fn position(&self) -> Vec3<f64> {
        self.pos
    }

    /// Orientation quaternion.
    pub fn orientation(&self) -> Quaternion<f64> {
        self.orientation
    }

    /// World transform.
    pub fn transform(&self) -> &Iso {
        &self.transform
    }

    /// Linear velocity.
    pub fn velocity(&self) -> Vec3<f64> {
        self.vel
    }

    /// Angular velocity.
    pub fn angular_velocity(&self) -> Vec3<f64> {
        self.ang_vel
    }

    /// Linear momentum.
    pub fn momentum(&self) -> Vec3<f64> {
        self.momentum
    }

    /// Angular momentum around the center of mass.
    pub fn angular_momentum(&self) -> Vec3<f64> {
        self.angular_momentum
    }

    /// Angular momentum around the world origin.
    pub fn total_angular_momentum(&self) -> Vec3<f64> {
        self.total_angular_momentum
    }

    /// Kinetic energy.
    pub fn kinetic_energy(&self) -> f64 {
        self.kinetic
    }

    /// Potential energy accumulated by the external forces of this step.
    pub fn potential_energy(&self) -> f64 {
        self.potential
    }

    /// Accumulated force.
    pub fn force(&self) -> Vec3<f64> {
        self.force
    }

    /// Inverse of the mass, zero for an immovable body.
    pub fn inverse_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Mass, or zero when the body is immovable.
    fn mass_or_zero(&self) -> f64 {
        if self.inv_mass > 0.0 {
            self.inv_mass.recip()
        } else {
            0.0
        }
    }

    /// Inverse inertia tensor in world coordinates.
    pub fn inverse_inertia_world(&self) -> &Mat3<f64> {
        &self.inv_inertia_world
    }

    /// Whether the body takes part in integration and resolution.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Allow or forbid the body to fall asleep on its own.
    pub fn set_can_deactivate(&mut self, can_deactivate: bool) {
        self.can_deactivate = can_deactivate;
    }

    /// Enable or disable momentum damping.
    pub fn set_damping(&mut self, damping: bool) {
        self.damping = damping;
    }
}

impl Display for RigidBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:10.4} {:24} {:32} {:24} {:24} {:24} {:24} {:12.6}",
            self.mass_or_zero(),
            format!("({:.3}, {:.3}, {:.3})", self.pos.x, self.pos.y, self.pos.z),
            format!(
                "({:.4}; {:.4}, {:.4}, {:.4})",
                self.orientation.w, self.orientation.x, self.orientation.y, self.orientation.z
            ),
            format!(
                "({:.3}, {:.3}, {:.3})",
                self.momentum.x, self.momentum.y, self.momentum.z
            ),
            format!(
                "({:.3}, {:.3}, {:.3})",
                self.angular_momentum.x, self.angular_momentum.y, self.angular_momentum.z
            ),
            format!("({:.3}, {:.3}, {:.3})", self.vel.x, self.vel.y, self.vel.z),
            format!(
                "({:.3}, {:.3}, {:.3})",
                self.ang_vel.x, self.ang_vel.y, self.ang_vel.z
            ),
            self.kinetic,
        )
    }
}
