//! 3D rigid body dynamics with impulse based contact resolution.
//!
//! A [`physics::Physics`] world owns a fixed amount of geometries, the
//! rigid bodies attached to them and a contact arena. Every call to
//! [`physics::Physics::step`] integrates the Newton-Euler equations with
//! a semi-implicit Euler scheme, detects interpenetrations between all
//! geometry pairs and resolves them so bodies bounce and don't overlap.
//!
//! ```
//! use tumble::Physics;
//! use vek::Vec3;
//!
//! let mut world = Physics::new(16, 64);
//! world.set_gravity(Vec3::new(0.0, -9.81, 0.0));
//!
//! let _floor = world.add_half_space(Vec3::unit_y(), 0.0).unwrap();
//! let ball = world.add_sphere(1.0).unwrap();
//! world.set_initial(
//!     ball,
//!     Vec3::new(0.0, 10.0, 0.0),
//!     vek::Quaternion::identity(),
//!     Vec3::zero(),
//!     Vec3::zero(),
//! );
//!
//! for _ in 0..100 {
//!     world.step(1.0 / 60.0);
//! }
//! ```

pub mod math;
pub mod physics;

pub use physics::{ContactInfo, GeometryKey, Physics, Settings, SevereError};
