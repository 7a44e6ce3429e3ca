pub mod primitives;
pub mod sat;

use vek::{Mat3, Vec3};

use crate::math::Iso;

use super::geometry::Shape;
use super::rigidbody::RigidBodyKey;

/// A single point of interpenetration between two geometries.
///
/// The normal is unit length and points in the direction the first body
/// has to move to resolve the contact. The second body is `None` for
/// contacts against immovable scenery.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    /// First body of the pair.
    ///
    /// Detection may leave this `None` for scenery; the solver swaps the
    /// pair before resolution so it is always `Some` afterwards.
    pub body_a: Option<RigidBodyKey>,
    /// Second body, `None` against scenery.
    pub body_b: Option<RigidBodyKey>,
    /// Contact point in world coordinates.
    pub point: Vec3<f64>,
    /// Unit contact normal.
    pub normal: Vec3<f64>,
    /// Penetration depth, non-negative while unresolved.
    pub penetration: f64,
    /// Restitution coefficient for this contact.
    pub restitution: f64,
    /// Friction coefficient for this contact.
    pub friction: f64,
    /// Contact-to-world basis, first column is the normal.
    pub basis: Mat3<f64>,
    /// Contact point relative to the first body's center.
    pub rel_a: Vec3<f64>,
    /// Contact point relative to the second body's center.
    pub rel_b: Vec3<f64>,
    /// Closing velocity in the contact frame.
    pub contact_velocity: Vec3<f64>,
    /// Normal component of the velocity the accumulated forces add this step.
    pub acc_normal_velocity: f64,
    /// Change in normal velocity needed for a correct rebound.
    pub desired_delta_velocity: f64,
}

impl Contact {
    /// Construct a fresh contact, the solver fills the derived fields.
    pub fn new(
        body_a: Option<RigidBodyKey>,
        body_b: Option<RigidBodyKey>,
        point: Vec3<f64>,
        normal: Vec3<f64>,
        penetration: f64,
        restitution: f64,
        friction: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            point,
            normal,
            penetration,
            restitution,
            friction,
            basis: Mat3::identity(),
            rel_a: Vec3::zero(),
            rel_b: Vec3::zero(),
            contact_velocity: Vec3::zero(),
            acc_normal_velocity: 0.0,
            desired_delta_velocity: 0.0,
        }
    }

    /// Whether the second side of the contact is immovable scenery.
    pub fn is_scenery(&self) -> bool {
        self.body_a.is_none() || self.body_b.is_none()
    }
}

/// Fixed-capacity arena of contacts filled during detection.
///
/// Created once per world; the allocation never grows. When the arena is
/// full further contacts are dropped, which a driver can observe by
/// comparing the count against the capacity.
#[derive(Debug)]
pub struct ContactRegistry {
    /// Registered contacts of the current step.
    contacts: Vec<Contact>,
    /// Maximum amount of contacts, fixed at construction.
    capacity: usize,
}

impl ContactRegistry {
    /// Create an empty registry with room for a fixed amount of contacts.
    pub fn new(capacity: usize) -> Self {
        let contacts = Vec::with_capacity(capacity);

        Self { contacts, capacity }
    }

    /// Forget all contacts of the previous step.
    pub fn clear(&mut self) {
        self.contacts.clear();
    }

    /// Whether another contact can still be registered.
    pub fn has_space(&self) -> bool {
        self.contacts.len() < self.capacity
    }

    /// Register a new contact.
    ///
    /// Returns `false` when the arena is full, in which case the contact
    /// is dropped.
    pub fn push(&mut self, contact: Contact) -> bool {
        if !self.has_space() {
            return false;
        }

        self.contacts.push(contact);

        true
    }

    /// Amount of contacts registered this step.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether no contacts are registered.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Maximum amount of contacts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All contacts of the current step.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Mutable view of all contacts, used by the solvers.
    pub fn contacts_mut(&mut self) -> &mut [Contact] {
        &mut self.contacts
    }
}

/// A shape with its world transform and owning body resolved.
///
/// Input to the narrow phase detectors.
#[derive(Debug, Clone, Copy)]
pub struct Placed {
    /// Collision shape.
    pub shape: Shape,
    /// World transform of the shape.
    pub iso: Iso,
    /// Owning body, `None` for scenery.
    pub body: Option<RigidBodyKey>,
}

/// Detect contacts between an unordered pair of placed shapes.
///
/// Dispatches to the detector for the pair of shape variants and returns
/// the amount of contacts registered. Pairs of scenery shapes and other
/// unsupported combinations are no-ops.
pub fn detect(
    registry: &mut ContactRegistry,
    a: &Placed,
    b: &Placed,
    restitution: f64,
    friction: f64,
) -> usize {
    use Shape::{Cuboid, HalfSpace, Plane, Sphere};

    match (a.shape, b.shape) {
        (Sphere { radius: ra }, Sphere { radius: rb }) => {
            primitives::sphere_sphere(registry, a, ra, b, rb, restitution, friction)
        }
        (Sphere { radius }, HalfSpace { normal, offset }) => {
            primitives::sphere_half_space(registry, a, radius, normal, offset, restitution, friction)
        }
        (HalfSpace { normal, offset }, Sphere { radius }) => {
            primitives::sphere_half_space(registry, b, radius, normal, offset, restitution, friction)
        }
        (Sphere { radius }, Plane { normal, offset }) => {
            primitives::sphere_plane(registry, a, radius, normal, offset, restitution, friction)
        }
        (Plane { normal, offset }, Sphere { radius }) => {
            primitives::sphere_plane(registry, b, radius, normal, offset, restitution, friction)
        }
        (Cuboid { half }, Sphere { radius }) => {
            primitives::cuboid_sphere(registry, a, half, b, radius, restitution, friction)
        }
        (Sphere { radius }, Cuboid { half }) => {
            primitives::cuboid_sphere(registry, b, half, a, radius, restitution, friction)
        }
        (Cuboid { half }, HalfSpace { normal, offset }) => {
            primitives::cuboid_half_space(registry, a, half, normal, offset, restitution, friction)
        }
        (HalfSpace { normal, offset }, Cuboid { half }) => {
            primitives::cuboid_half_space(registry, b, half, normal, offset, restitution, friction)
        }
        (Cuboid { half: ha }, Cuboid { half: hb }) => {
            sat::cuboid_cuboid(registry, a, ha, b, hb, restitution, friction)
        }
        // Scenery never collides with scenery, and planes don't pair with cuboids
        _ => 0,
    }
}
