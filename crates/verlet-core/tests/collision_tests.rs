use glam::Vec3;
use verlet_core::{EngineConfig, ParticleTemplate, PhysicsEngine};

const DT: f32 = 1.0 / 60.0;

fn engine() -> PhysicsEngine {
    let mut config = EngineConfig::with_capacity(256, 1);
    config.spatial_hash_cell_size = 10.0;
    config.simulation.gravity = Vec3::ZERO;
    config.simulation.global_damping = 0.0;
    PhysicsEngine::initialize(config).expect("engine init")
}

fn positions(engine: &PhysicsEngine, count: u32) -> Vec<Vec3> {
    engine
        .read_positions(count)
        .unwrap()
        .wait()
        .unwrap()
        .into_iter()
        .map(Vec3::from_array)
        .collect()
}

#[test]
fn test_overlapping_pair_separates_after_one_update() {
    let mut engine = engine();
    engine
        .add_particle_batch(&[
            ParticleTemplate::at(Vec3::new(0.5, 0.5, 0.5)),
            ParticleTemplate::at(Vec3::new(1.5, 0.5, 0.5)),
        ])
        .unwrap();
    engine.update(DT).unwrap();

    let p = positions(&engine, 2);
    let dist = p[0].distance(p[1]);
    assert!((dist - 2.0).abs() < 1e-4, "distance after update: {}", dist);
    // Equal masses move equally, in opposite directions.
    assert!((p[0].x - 0.0).abs() < 1e-4 && (p[1].x - 2.0).abs() < 1e-4);
    assert_eq!(engine.last_frame().contacts, 1);
}

#[test]
fn test_heavier_particle_moves_less() {
    let mut engine = engine();
    engine
        .add_particle_batch(&[
            ParticleTemplate::at(Vec3::new(1.0, 1.0, 1.0)).with_mass(3.0),
            ParticleTemplate::at(Vec3::new(2.0, 1.0, 1.0)).with_mass(1.0),
        ])
        .unwrap();
    engine.update(DT).unwrap();

    let p = positions(&engine, 2);
    assert!((p[0].x - 0.75).abs() < 1e-4, "heavy moved to {}", p[0].x);
    assert!((p[1].x - 2.75).abs() < 1e-4, "light moved to {}", p[1].x);
}

#[test]
fn test_anchored_particle_is_not_pushed() {
    let mut engine = engine();
    engine
        .add_particle_batch(&[
            ParticleTemplate::at(Vec3::new(1.0, 1.0, 1.0)).pinned(),
            ParticleTemplate::at(Vec3::new(1.5, 1.0, 1.0)),
        ])
        .unwrap();
    engine.update(DT).unwrap();

    let p = positions(&engine, 2);
    assert_eq!(p[0], Vec3::ONE);
    assert!((p[1].x - 3.0).abs() < 1e-4);
}

#[test]
fn test_only_same_cell_pairs_collide() {
    let mut engine = engine();
    // Overlapping, but on either side of the x = 10 cell boundary.
    engine
        .add_particle_batch(&[
            ParticleTemplate::at(Vec3::new(9.5, 1.0, 1.0)),
            ParticleTemplate::at(Vec3::new(10.5, 1.0, 1.0)),
        ])
        .unwrap();
    engine.update(DT).unwrap();

    let p = positions(&engine, 2);
    assert!((p[0].distance(p[1]) - 1.0).abs() < 1e-5);
    assert_eq!(engine.last_frame().contacts, 0);
}

#[test]
fn test_collisions_can_be_disabled() {
    let mut engine = engine();
    engine.set_collisions_enabled(false);
    engine
        .add_particle_batch(&[
            ParticleTemplate::at(Vec3::new(0.5, 0.5, 0.5)),
            ParticleTemplate::at(Vec3::new(1.5, 0.5, 0.5)),
        ])
        .unwrap();
    engine.update(DT).unwrap();
    let p = positions(&engine, 2);
    assert!((p[0].distance(p[1]) - 1.0).abs() < 1e-5);
}

#[test]
fn test_dense_cluster_stays_finite() {
    let mut engine = engine();
    let t = ParticleTemplate::at(Vec3::splat(5.0))
        .with_radius(0.5)
        .with_jitter(Vec3::splat(2.0));
    engine.add_particles(200, &t).unwrap();
    for _ in 0..20 {
        engine.update(DT).unwrap();
    }
    assert!(positions(&engine, 200).iter().all(|p| p.is_finite()));
}
