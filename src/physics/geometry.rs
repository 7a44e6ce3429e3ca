use slotmap::SlotMap;
use vek::{Mat3, Vec3};

use crate::math::Iso;

use super::rigidbody::{RigidBody, RigidBodyKey};

/// Collision shape of a geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Ball around the body position.
    Sphere {
        /// Radius, must be positive.
        radius: f64,
    },
    /// Oriented box around the body position.
    Cuboid {
        /// Half extent in each local axis direction, all positive.
        half: Vec3<f64>,
    },
    /// Everything on one side of a plane, the normal points out of it.
    HalfSpace {
        /// Unit plane normal.
        normal: Vec3<f64>,
        /// Plane offset along the normal.
        offset: f64,
    },
    /// Two-sided infinite plane.
    Plane {
        /// Unit plane normal.
        normal: Vec3<f64>,
        /// Plane offset along the normal.
        offset: f64,
    },
}

impl Shape {
    /// Principal inertia tensor for a solid shape of the given mass.
    ///
    /// Scenery shapes have no inertia and yield a zero tensor.
    pub fn inertia(&self, mass: f64) -> Mat3<f64> {
        match self {
            Shape::Sphere { radius } => {
                let moment = 2.0 / 5.0 * mass * radius * radius;

                diagonal(moment, moment, moment)
            }
            Shape::Cuboid { half } => {
                // Standard solid cuboid formula over the full side lengths
                let size = *half * 2.0;
                let twelfth = mass / 12.0;

                diagonal(
                    twelfth * (size.y * size.y + size.z * size.z),
                    twelfth * (size.x * size.x + size.z * size.z),
                    twelfth * (size.x * size.x + size.y * size.y),
                )
            }
            Shape::HalfSpace { .. } | Shape::Plane { .. } => Mat3::zero(),
        }
    }

    /// Volume of the shape, zero for the unbounded scenery shapes.
    pub fn volume(&self) -> f64 {
        match self {
            Shape::Sphere { radius } => 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3),
            Shape::Cuboid { half } => 8.0 * half.x * half.y * half.z,
            Shape::HalfSpace { .. } | Shape::Plane { .. } => 0.0,
        }
    }
}

/// A shape placed in the world, optionally owned by a rigid body.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Collision shape.
    pub shape: Shape,
    /// Owning body, `None` for immovable scenery.
    pub body: Option<RigidBodyKey>,
}

impl Geometry {
    /// Construct a geometry owned by a body.
    pub fn new(shape: Shape, body: RigidBodyKey) -> Self {
        Self {
            shape,
            body: Some(body),
        }
    }

    /// Construct immovable scenery.
    pub fn scenery(shape: Shape) -> Self {
        Self { shape, body: None }
    }

    /// Whether this geometry has no owning body.
    pub fn is_scenery(&self) -> bool {
        self.body.is_none()
    }

    /// World transform of the geometry.
    ///
    /// Scenery sits at the world origin with the world basis.
    pub fn transform(&self, bodies: &SlotMap<RigidBodyKey, RigidBody>) -> Iso {
        self.body
            .and_then(|key| bodies.get(key))
            .map(|body| *body.transform())
            .unwrap_or_default()
    }
}

/// Diagonal matrix from the three principal moments.
fn diagonal(x: f64, y: f64, z: f64) -> Mat3<f64> {
    Mat3::new(x, 0.0, 0.0, 0.0, y, 0.0, 0.0, 0.0, z)
}
