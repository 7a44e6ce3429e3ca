//! End-to-end simulation scenarios driving a whole world.

use tumble::Physics;
use vek::{Quaternion, Vec3};

/// Standard gravity pointing down.
const GRAVITY: Vec3<f64> = Vec3 {
    x: 0.0,
    y: -9.81,
    z: 0.0,
};

/// A sphere in free fall follows the discrete parabola and keeps its
/// total energy.
#[test]
fn test_free_fall() {
    let mut world = Physics::new(4, 16);
    world.set_gravity(GRAVITY);

    let sphere = world.add_sphere(1.0).unwrap();
    world.set_mass(sphere, 1.0);
    world.set_damping(sphere, false);
    world.set_initial(
        sphere,
        Vec3::new(0.0, 10.0, 0.0),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );

    let h = 0.01;
    for _ in 0..100 {
        world.step(h);
    }

    let body = world.body(sphere).unwrap();

    // The symplectic scheme lands exactly on the discrete sum and trails
    // the continuous parabola by half a step of velocity
    let discrete = 10.0 - 9.81 * h * h * (100.0 * 101.0 / 2.0);
    assert!((body.position().y - discrete).abs() < 1e-9);
    let continuous = 10.0 - 9.81 / 2.0;
    assert!((body.position().y - continuous).abs() < 0.06);

    // Velocity matches gravity exactly after one second
    assert!((body.velocity().y + 9.81).abs() < 1e-9);

    // Kinetic plus potential energy stays within half a percent
    let initial_energy = 9.81 * 10.0;
    assert!((world.total_energy() - initial_energy).abs() / initial_energy < 0.005);
}

/// A perfectly elastic sphere dropped on the ground recovers almost all
/// of its height, without ever penetrating deeper than the tolerance.
#[test]
fn test_ground_bounce() {
    let mut world = Physics::new(4, 16);
    world.set_gravity(GRAVITY);
    world.set_restitution(1.0);
    world.set_friction(0.0);

    world.add_half_space(Vec3::unit_y(), 0.0).unwrap();
    let sphere = world.add_sphere(1.0).unwrap();
    world.set_mass(sphere, 1.0);
    world.set_damping(sphere, false);
    world.set_initial(
        sphere,
        Vec3::new(0.0, 10.0, 0.0),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );

    let mut bounced = false;
    let mut recovered: f64 = 0.0;

    for _ in 0..420 {
        world.step(0.01);

        for index in 0..world.contact_count() {
            let contact = world.contact(index).unwrap();
            assert!(
                contact.penetration <= 0.011,
                "resolved penetration too deep: {}",
                contact.penetration
            );
            assert!(contact.is_scenery);

            bounced = true;
        }

        if bounced {
            recovered = recovered.max(world.body(sphere).unwrap().position().y);
        }
    }

    assert!(bounced);
    assert!(recovered >= 9.8, "only recovered to {recovered}");
}

/// Five touching spheres pass the momentum of the first through to the
/// last, like a Newton's cradle.
#[test]
fn test_newtons_cradle() {
    let mut world = Physics::new(8, 32);
    world.set_restitution(1.0);
    world.set_friction(0.0);

    let mut spheres = Vec::new();
    for i in 0..5 {
        let sphere = world.add_sphere(1.0).unwrap();
        world.set_mass(sphere, 1.0);
        world.set_damping(sphere, false);

        let velocity = if i == 0 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            Vec3::zero()
        };
        world.set_initial(
            sphere,
            Vec3::new(i as f64 * 2.0, 0.0, 0.0),
            Quaternion::identity(),
            velocity,
            Vec3::zero(),
        );

        spheres.push(sphere);
    }

    for _ in 0..200 {
        world.step(0.01);
    }

    // Total linear momentum survives every impulse exchange
    assert!((world.linear_momentum() - Vec3::new(1.0, 0.0, 0.0)).magnitude() < 1e-9);

    let velocity_of = |key| world.body(key).unwrap().velocity();

    // The momentum ends up in the last sphere
    assert!((velocity_of(spheres[4]) - Vec3::new(1.0, 0.0, 0.0)).magnitude() < 0.1);
    for &sphere in &spheres[0..4] {
        assert!(
            velocity_of(sphere).magnitude() < 0.1,
            "sphere still moving at {:?}",
            velocity_of(sphere)
        );
    }
}

/// Two stacked cubes on the ground come to rest and fall asleep.
#[test]
fn test_resting_stack() {
    let mut world = Physics::new(8, 64);
    world.set_gravity(GRAVITY);
    world.set_restitution(0.0);
    world.set_friction(0.5);

    world.add_half_space(Vec3::unit_y(), 0.0).unwrap();

    let half = Vec3::new(0.5, 0.5, 0.5);
    let mut cubes = Vec::new();
    for level in 0..2 {
        let cube = world.add_cuboid(half).unwrap();
        world.set_mass(cube, 1.0);
        world.set_can_deactivate(cube, true);
        world.set_initial(
            cube,
            Vec3::new(0.0, 0.5 + level as f64, 0.0),
            Quaternion::identity(),
            Vec3::zero(),
            Vec3::zero(),
        );

        cubes.push(cube);
    }

    for _ in 0..500 {
        world.step(0.01);
    }

    for &cube in &cubes {
        let body = world.body(cube).unwrap();
        assert!(!body.is_active());
        assert!(body.velocity().magnitude() < 1e-3);
        assert!(body.angular_velocity().magnitude() < 1e-3);
    }
}

/// Two cubes overlapping at a corner are detected once and projected
/// apart within the tolerance.
#[test]
fn test_corner_overlap_is_projected_apart() {
    let mut world = Physics::new(4, 16);

    let half = Vec3::new(0.5, 0.5, 0.5);
    let a = world.add_cuboid(half).unwrap();
    world.set_initial(
        a,
        Vec3::zero(),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );
    let b = world.add_cuboid(half).unwrap();
    world.set_initial(
        b,
        Vec3::new(0.9, 0.9, 0.9),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );

    world.step(0.01);

    assert_eq!(world.contact_count(), 1);
    let contact = world.contact(0).unwrap();
    assert!(!contact.is_scenery);

    // With every face axis tied the normal is a single face axis
    assert!((contact.normal.magnitude() - 1.0).abs() < 1e-9);
    assert!((contact.normal.map(f64::abs).reduce_partial_max() - 1.0).abs() < 1e-9);

    // Projection already resolved the tenth of overlap
    assert!(contact.penetration <= 0.011);
    assert!(world.body(a).is_some() && world.body(b).is_some());
}

/// A sphere barely above a plane registers no contact, barely below
/// exactly one shallow one that projection leaves alone.
#[test]
fn test_plane_culling() {
    let mut world = Physics::new(4, 16);
    world.add_plane(Vec3::unit_y(), 0.0).unwrap();

    let sphere = world.add_sphere(1.0).unwrap();
    world.set_initial(
        sphere,
        Vec3::new(0.0, 1.0001, 0.0),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );
    world.step(0.01);
    assert_eq!(world.contact_count(), 0);

    world.set_initial(
        sphere,
        Vec3::new(0.0, 0.9999, 0.0),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );
    world.step(0.01);
    assert_eq!(world.contact_count(), 1);

    let contact = world.contact(0).unwrap();
    assert!((contact.penetration - 0.0001).abs() < 1e-6);
    assert!(contact.is_scenery);
}

/// Without forces, contacts and damping a tumbling body keeps its
/// momenta exactly and its energy within the integration drift.
#[test]
fn test_tumbling_conservation() {
    let mut world = Physics::new(4, 16);

    let cube = world.add_cuboid(Vec3::new(0.5, 0.3, 0.2)).unwrap();
    world.set_mass(cube, 2.0);
    world.set_damping(cube, false);
    world.set_initial(
        cube,
        Vec3::zero(),
        Quaternion::identity(),
        Vec3::new(0.3, 0.1, -0.2),
        Vec3::new(0.5, 1.0, 1.5),
    );

    let initial = {
        let body = world.body(cube).unwrap();
        (
            body.momentum(),
            body.angular_momentum(),
            body.kinetic_energy(),
        )
    };

    for _ in 0..100 {
        world.step(0.01);
    }

    let body = world.body(cube).unwrap();

    // The orientation stays a versor
    let q = body.orientation();
    let norm = (q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
    assert!((norm - 1.0).abs() < 1e-9);

    // Momenta are untouched, the energy drifts with the step size
    assert!((body.momentum() - initial.0).magnitude() < 1e-12);
    assert!((body.angular_momentum() - initial.1).magnitude() < 1e-12);
    assert!((body.kinetic_energy() - initial.2).abs() / initial.2 < 0.05);
}

/// An explicitly deactivated body ignores gravity and stays in place.
#[test]
fn test_deactivated_body_stays_put() {
    let mut world = Physics::new(4, 16);
    world.set_gravity(GRAVITY);

    let sphere = world.add_sphere(1.0).unwrap();
    world.set_initial(
        sphere,
        Vec3::new(0.0, 5.0, 0.0),
        Quaternion::identity(),
        Vec3::zero(),
        Vec3::zero(),
    );
    world.deactivate(sphere);

    let position = world.body(sphere).unwrap().position();
    let orientation = world.body(sphere).unwrap().orientation();

    for _ in 0..50 {
        world.step(0.01);
    }

    assert_eq!(world.body(sphere).unwrap().position(), position);
    assert_eq!(world.body(sphere).unwrap().orientation(), orientation);

    // An internal force wakes it up again
    world.add_force(sphere, Vec3::new(1.0, 0.0, 0.0));
    assert!(world.body(sphere).unwrap().is_active());
}

/// The contact arena never grows past its capacity; overflow contacts
/// are dropped for the rest of the step.
#[test]
fn test_registry_saturation() {
    let mut world = Physics::new(8, 4);

    // A cluster of overlapping spheres with ten touching pairs
    for i in 0..5 {
        let sphere = world.add_sphere(2.0).unwrap();
        world.set_initial(
            sphere,
            Vec3::new(i as f64 * 0.5, 0.0, 0.0),
            Quaternion::identity(),
            Vec3::zero(),
            Vec3::zero(),
        );
    }

    world.step(0.01);

    assert_eq!(world.contact_count(), 4);
    assert!(world.contact(3).is_some());
    assert!(world.contact(4).is_none());
}
