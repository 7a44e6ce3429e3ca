//! Impulse based rigid body physics engine.
//!
//! The world owns every body, geometry and contact. A step applies
//! gravity, integrates the bodies, detects interpenetrations between all
//! geometry pairs and resolves them with sequential impulses followed by
//! position projection.

pub mod collision;
pub mod geometry;
pub mod rigidbody;
pub mod solver;

use std::fmt::{self, Display};

use itertools::Itertools;
use serde::Deserialize;
use slotmap::SlotMap;
use vek::{Quaternion, Vec3};

use self::collision::{ContactRegistry, Placed};
use self::geometry::{Geometry, Shape};
use self::rigidbody::{RigidBody, RigidBodyKey};

/// Index of a geometry inside the world.
pub type GeometryKey = usize;

/// Physics simulation state.
///
/// All storage is reserved at construction; stepping never allocates.
pub struct Physics {
    /// Tunable simulation parameters.
    settings: Settings,
    /// Gravitational acceleration applied to every body each step.
    gravity: Vec3<f64>,
    /// All rigid bodies, owned through their geometries.
    bodies: SlotMap<RigidBodyKey, RigidBody>,
    /// All geometries in insertion order.
    geometries: Vec<Geometry>,
    /// Maximum amount of geometries, fixed at construction.
    max_objects: usize,
    /// Contact arena filled by detection and drained by the solvers.
    registry: ContactRegistry,
    /// Resolved shape placements.
    ///
    /// This is a performance optimization so the vector doesn't have to be
    /// allocated every step.
    placed: Vec<Placed>,
    /// Simulated time.
    time: f64,
    /// Amount of steps taken.
    steps: u64,
    /// Total kinetic energy of the last step.
    kinetic: f64,
    /// Total potential energy of the last step.
    potential: f64,
    /// Total linear momentum of the last step.
    linear_momentum: Vec3<f64>,
    /// Total angular momentum around the origin of the last step.
    angular_momentum: Vec3<f64>,
    /// Sink unrecoverable misuse is reported to.
    severe_sink: Box<dyn Fn(&SevereError)>,
}

impl Physics {
    /// Create a world with fixed capacities for geometries and contacts.
    pub fn new(max_objects: usize, max_collisions: usize) -> Self {
        log::debug!(
            "Creating physics world for {max_objects} geometries and {max_collisions} contacts"
        );

        let settings = Settings::default();
        let gravity = Vec3::zero();
        let bodies = SlotMap::with_capacity_and_key(max_objects);
        let geometries = Vec::with_capacity(max_objects);
        let registry = ContactRegistry::new(max_collisions);
        let placed = Vec::with_capacity(max_objects);
        let severe_sink: Box<dyn Fn(&SevereError)> =
            Box::new(|error| log::error!("Physics misuse: {error}"));

        Self {
            settings,
            gravity,
            bodies,
            geometries,
            max_objects,
            registry,
            placed,
            time: 0.0,
            steps: 0,
            kinetic: 0.0,
            potential: 0.0,
            linear_momentum: Vec3::zero(),
            angular_momentum: Vec3::zero(),
            severe_sink,
        }
    }

    /// Simulate a single step.
    pub fn step(&mut self, dt: f64) {
        puffin::profile_scope!("Physics step");

        self.apply_gravity();

        {
            puffin::profile_scope!("Integrate");

            for body in self.bodies.values_mut() {
                body.integrate(dt);
            }
        }

        self.time += dt;
        self.steps += 1;

        self.update_aggregates();

        self.detect_contacts();

        solver::prepare_contacts(&mut self.registry, &self.bodies, dt);

        let max_iterations = self.settings.iteration_multiplier * self.registry.len();
        solver::velocity::solve(
            &mut self.bodies,
            &mut self.registry,
            self.settings.velocity_epsilon,
            max_iterations,
        );
        solver::projection::solve(
            &mut self.bodies,
            &mut self.registry,
            self.settings.penetration_epsilon,
            self.settings.relaxation,
            max_iterations,
        );

        for body in self.bodies.values_mut() {
            body.clear_accumulators();
        }
    }

    /// Reset the clock, forces, contacts and aggregates.
    ///
    /// Bodies and geometries are kept.
    pub fn initialize(&mut self) {
        log::debug!("Initializing physics world");

        self.time = 0.0;
        self.steps = 0;
        self.registry.clear();
        self.kinetic = 0.0;
        self.potential = 0.0;
        self.linear_momentum = Vec3::zero();
        self.angular_momentum = Vec3::zero();

        for body in self.bodies.values_mut() {
            body.clear_accumulators();
        }
    }

    /// Add a sphere with a fresh unit mass body.
    ///
    /// Returns `None` when the world is at capacity.
    pub fn add_sphere(&mut self, radius: f64) -> Option<GeometryKey> {
        debug_assert!(radius > 0.0);

        self.add_with_body(Shape::Sphere { radius })
    }

    /// Add a cuboid with a fresh unit mass body.
    ///
    /// Returns `None` when the world is at capacity.
    pub fn add_cuboid(&mut self, half: Vec3<f64>) -> Option<GeometryKey> {
        debug_assert!(half.x > 0.0 && half.y > 0.0 && half.z > 0.0);

        self.add_with_body(Shape::Cuboid { half })
    }

    /// Add an immovable half-space covering everything below the plane.
    pub fn add_half_space(&mut self, normal: Vec3<f64>, offset: f64) -> Option<GeometryKey> {
        self.add_scenery(Shape::HalfSpace {
            normal: normal.normalized(),
            offset,
        })
    }

    /// Add an immovable two-sided plane.
    pub fn add_plane(&mut self, normal: Vec3<f64>, offset: f64) -> Option<GeometryKey> {
        self.add_scenery(Shape::Plane {
            normal: normal.normalized(),
            offset,
        })
    }

    /// Remove every geometry and body.
    pub fn clear_geometries(&mut self) {
        self.geometries.clear();
        self.bodies.clear();
        self.registry.clear();
    }

    /// Set the gravitational acceleration.
    pub fn set_gravity(&mut self, gravity: Vec3<f64>) {
        self.gravity = gravity;
    }

    /// Set the restitution coefficient of new contacts.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.settings.restitution = restitution;
    }

    /// Set the relaxation factor of the position projection.
    pub fn set_relaxation(&mut self, relaxation: f64) {
        self.settings.relaxation = relaxation;
    }

    /// Set the friction coefficient of new contacts.
    pub fn set_friction(&mut self, friction: f64) {
        self.settings.friction = friction;
    }

    /// Replace all settings at once, for values loaded from a file.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Install the sink unrecoverable misuse is reported to.
    ///
    /// The default sink logs an error.
    pub fn set_severe_sink(&mut self, sink: Box<dyn Fn(&SevereError)>) {
        self.severe_sink = sink;
    }

    /// Total kinetic plus potential energy.
    pub fn total_energy(&self) -> f64 {
        self.kinetic + self.potential
    }

    /// Total kinetic energy.
    pub fn kinetic_energy(&self) -> f64 {
        self.kinetic
    }

    /// Total potential energy of the applied external forces.
    pub fn potential_energy(&self) -> f64 {
        self.potential
    }

    /// Total linear momentum.
    pub fn linear_momentum(&self) -> Vec3<f64> {
        self.linear_momentum
    }

    /// Total angular momentum around the world origin.
    pub fn angular_momentum(&self) -> Vec3<f64> {
        self.angular_momentum
    }

    /// Simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Amount of steps taken.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Amount of geometries in the world.
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Amount of contacts registered in the last step.
    pub fn contact_count(&self) -> usize {
        self.registry.len()
    }

    /// Read-only view of a contact of the last step.
    ///
    /// An index at or past the contact count is misuse and yields `None`.
    pub fn contact(&self, index: usize) -> Option<ContactInfo> {
        let Some(contact) = self.registry.contacts().get(index) else {
            (self.severe_sink)(&SevereError::IndexOutOfBounds {
                index,
                count: self.registry.len(),
            });

            return None;
        };

        Some(ContactInfo {
            position: contact.point,
            normal: contact.normal,
            penetration: contact.penetration,
            is_scenery: contact.is_scenery(),
        })
    }

    /// The rigid body owning a geometry, `None` for scenery.
    pub fn body(&self, geometry: GeometryKey) -> Option<&RigidBody> {
        self.geometries
            .get(geometry)?
            .body
            .and_then(|key| self.bodies.get(key))
    }

    /// Iterator over all geometries with a rigid body.
    pub fn bodies(&self) -> impl Iterator<Item = (GeometryKey, &RigidBody)> {
        self.geometries
            .iter()
            .enumerate()
            .filter_map(|(index, geometry)| {
                let body = geometry.body.and_then(|key| self.bodies.get(key))?;

                Some((index, body))
            })
    }

    /// Set the mass of a body, also setting the inertia of its shape.
    ///
    /// A mass of zero or above [`rigidbody::MAX_FINITE_MASS`] makes the
    /// body immovable.
    pub fn set_mass(&mut self, geometry: GeometryKey, mass: f64) -> bool {
        let Some(shape) = self.geometries.get(geometry).map(|geometry| geometry.shape) else {
            self.report_geometry_out_of_bounds(geometry);

            return false;
        };

        let inertia = shape.inertia(mass);
        let Some(body) = self.body_mut(geometry) else {
            return false;
        };

        if !body.set_mass_properties(mass, inertia) {
            (self.severe_sink)(&SevereError::SingularInertia);

            return false;
        }

        true
    }

    /// Set the initial state of a body.
    ///
    /// Momenta and derived quantities are computed from the velocities. An
    /// orientation that cannot be normalized is misuse and defaults to
    /// identity.
    pub fn set_initial(
        &mut self,
        geometry: GeometryKey,
        pos: Vec3<f64>,
        orientation: Quaternion<f64>,
        vel: Vec3<f64>,
        ang_vel: Vec3<f64>,
    ) -> bool {
        let Some(body) = self.body_mut(geometry) else {
            return false;
        };

        if !body.set_state(pos, orientation, vel, ang_vel) {
            (self.severe_sink)(&SevereError::DegenerateOrientation);

            return false;
        }

        true
    }

    /// Allow or forbid a body to fall asleep on its own.
    pub fn set_can_deactivate(&mut self, geometry: GeometryKey, can_deactivate: bool) -> bool {
        self.body_mut(geometry)
            .map(|body| body.set_can_deactivate(can_deactivate))
            .is_some()
    }

    /// Enable or disable momentum damping on a body.
    pub fn set_damping(&mut self, geometry: GeometryKey, damping: bool) -> bool {
        self.body_mut(geometry)
            .map(|body| body.set_damping(damping))
            .is_some()
    }

    /// Wake a body up.
    pub fn activate(&mut self, geometry: GeometryKey) -> bool {
        self.body_mut(geometry)
            .map(|body| body.activate())
            .is_some()
    }

    /// Put a body to sleep.
    pub fn deactivate(&mut self, geometry: GeometryKey) -> bool {
        self.body_mut(geometry)
            .map(|body| body.deactivate())
            .is_some()
    }

    /// Apply an external force at the center of mass of a body.
    ///
    /// Doesn't wake a sleeping body.
    pub fn add_external_force(&mut self, geometry: GeometryKey, force: Vec3<f64>) -> bool {
        self.body_mut(geometry)
            .map(|body| body.add_external_force(force))
            .is_some()
    }

    /// Apply an internal force at the center of mass of a body, waking it.
    pub fn add_force(&mut self, geometry: GeometryKey, force: Vec3<f64>) -> bool {
        self.body_mut(geometry)
            .map(|body| body.add_force(force))
            .is_some()
    }

    /// Apply a force at a world point of a body, waking it.
    pub fn add_force_at_point(
        &mut self,
        geometry: GeometryKey,
        force: Vec3<f64>,
        point: Vec3<f64>,
    ) -> bool {
        self.body_mut(geometry)
            .map(|body| body.add_force_at_point(force, point))
            .is_some()
    }

    /// Apply a force at a body frame point of a body, waking it.
    pub fn add_force_at_body_point(
        &mut self,
        geometry: GeometryKey,
        force: Vec3<f64>,
        point: Vec3<f64>,
    ) -> bool {
        self.body_mut(geometry)
            .map(|body| body.add_force_at_body_point(force, point))
            .is_some()
    }

    /// Write a human readable dump of the world state.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "time {:.4}  steps {}  contacts {}",
            self.time,
            self.steps,
            self.registry.len()
        )?;
        writeln!(
            out,
            "gravity ({:.3}, {:.3}, {:.3})  restitution {:.3}  relaxation {:.3}  friction {:.3}",
            self.gravity.x,
            self.gravity.y,
            self.gravity.z,
            self.settings.restitution,
            self.settings.relaxation,
            self.settings.friction
        )?;
        writeln!(
            out,
            "{:>10} {:>24} {:>32} {:>24} {:>24} {:>24} {:>24} {:>12}",
            "mass",
            "position",
            "orientation",
            "momentum",
            "angular momentum",
            "velocity",
            "angular velocity",
            "kinetic"
        )?;

        for (_, body) in self.bodies() {
            writeln!(out, "{body}")?;
        }

        Ok(())
    }

    /// Add a shape with a fresh unit mass body attached.
    fn add_with_body(&mut self, shape: Shape) -> Option<GeometryKey> {
        if self.geometries.len() >= self.max_objects {
            (self.severe_sink)(&SevereError::CapacityExceeded {
                capacity: self.max_objects,
            });

            return None;
        }

        let mut body = RigidBody::new(
            self.settings.linear_damping,
            self.settings.angular_damping,
        );
        body.set_mass_properties(1.0, shape.inertia(1.0));

        let key = self.bodies.insert(body);
        self.geometries.push(Geometry::new(shape, key));

        Some(self.geometries.len() - 1)
    }

    /// Add an immovable shape without a body.
    fn add_scenery(&mut self, shape: Shape) -> Option<GeometryKey> {
        if self.geometries.len() >= self.max_objects {
            (self.severe_sink)(&SevereError::CapacityExceeded {
                capacity: self.max_objects,
            });

            return None;
        }

        self.geometries.push(Geometry::scenery(shape));

        Some(self.geometries.len() - 1)
    }

    /// Apply gravity as an external force scaled by each body's mass.
    fn apply_gravity(&mut self) {
        for body in self.bodies.values_mut() {
            if body.inverse_mass() > 0.0 {
                let force = self.gravity / body.inverse_mass();
                body.add_external_force(force);
            }
        }
    }

    /// Recompute the energy and momentum totals.
    fn update_aggregates(&mut self) {
        self.kinetic = 0.0;
        self.potential = 0.0;
        self.linear_momentum = Vec3::zero();
        self.angular_momentum = Vec3::zero();

        for body in self.bodies.values() {
            self.kinetic += body.kinetic_energy();
            self.potential += body.potential_energy();
            self.linear_momentum += body.momentum();
            self.angular_momentum += body.total_angular_momentum();
        }
    }

    /// Scan all geometry pairs and fill the contact registry.
    fn detect_contacts(&mut self) {
        puffin::profile_scope!("Collision detection");

        self.registry.clear();

        self.placed.clear();
        for geometry in &self.geometries {
            self.placed.push(Placed {
                shape: geometry.shape,
                iso: geometry.transform(&self.bodies),
                body: geometry.body,
            });
        }

        // Lexicographic pair order keeps the scan deterministic
        for (i, j) in (0..self.placed.len()).tuple_combinations() {
            if !self.registry.has_space() {
                log::warn!(
                    "Contact registry is full at {} contacts, dropping the rest of the step",
                    self.registry.capacity()
                );

                return;
            }

            collision::detect(
                &mut self.registry,
                &self.placed[i],
                &self.placed[j],
                self.settings.restitution,
                self.settings.friction,
            );
        }
    }

    /// Mutable body of a geometry, reporting misuse for a bad index.
    fn body_mut(&mut self, geometry: GeometryKey) -> Option<&mut RigidBody> {
        if geometry >= self.geometries.len() {
            self.report_geometry_out_of_bounds(geometry);

            return None;
        }

        self.geometries[geometry]
            .body
            .and_then(|key| self.bodies.get_mut(key))
    }

    fn report_geometry_out_of_bounds(&self, geometry: GeometryKey) {
        (self.severe_sink)(&SevereError::IndexOutOfBounds {
            index: geometry,
            count: self.geometries.len(),
        });
    }
}

/// Physics settings, tunable by the embedder.
///
/// Loaded from a file so it's easier to change them with hot-reloading.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Bounciness of new contacts, 1 is a perfect bounce.
    pub restitution: f64,
    /// Fraction of each projection step held back to damp oscillation.
    pub relaxation: f64,
    /// Coulomb friction coefficient of new contacts, 0 is frictionless.
    pub friction: f64,
    /// Linear momentum kept per second, zero disables linear damping.
    pub linear_damping: f64,
    /// Angular momentum kept per second.
    pub angular_damping: f64,
    /// Closing velocities below this are left to the position projection.
    pub velocity_epsilon: f64,
    /// Penetrations below this are accepted as resolved.
    pub penetration_epsilon: f64,
    /// Both solvers cap their iterations at this multiple of the contact
    /// count.
    pub iteration_multiplier: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restitution: 1.0,
            relaxation: 0.2,
            friction: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.998,
            velocity_epsilon: 0.01,
            penetration_epsilon: 0.01,
            iteration_multiplier: 8,
        }
    }
}

/// Unrecoverable misuse of the world surface.
///
/// Reported through the installed severe sink; the offending operation
/// returns a safe default and the simulation continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SevereError {
    /// More geometries than the world was constructed for.
    CapacityExceeded {
        /// The fixed geometry capacity.
        capacity: usize,
    },
    /// A geometry or contact index outside the valid range.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The valid amount.
        count: usize,
    },
    /// An orientation with a vanishing norm cannot be normalized.
    DegenerateOrientation,
    /// A singular inertia tensor cannot be inverted.
    SingularInertia,
}

impl Display for SevereError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SevereError::CapacityExceeded { capacity } => {
                write!(f, "geometry capacity of {capacity} exceeded")
            }
            SevereError::IndexOutOfBounds { index, count } => {
                write!(f, "index {index} out of bounds for {count} items")
            }
            SevereError::DegenerateOrientation => {
                write!(f, "orientation with zero norm defaulted to identity")
            }
            SevereError::SingularInertia => {
                write!(f, "singular inertia tensor, the inverse is set to zero")
            }
        }
    }
}

impl std::error::Error for SevereError {}

/// Read-only view of a registered contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInfo {
    /// Contact point in world coordinates.
    pub position: Vec3<f64>,
    /// Unit contact normal.
    pub normal: Vec3<f64>,
    /// Remaining penetration depth.
    pub penetration: f64,
    /// Whether one side of the contact is immovable scenery.
    pub is_scenery: bool,
}
