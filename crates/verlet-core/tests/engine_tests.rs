use glam::Vec3;
use verlet_core::device::{DeviceDescriptor, Limits};
use verlet_core::{
    ConstraintSpec, EngineConfig, EngineError, InitError, ParticleTemplate, PhysicsEngine,
};

fn engine(max_particles: u32, max_constraints: u32) -> PhysicsEngine {
    PhysicsEngine::initialize(EngineConfig::with_capacity(max_particles, max_constraints))
        .expect("engine init")
}

#[test]
fn test_initialize_rejects_invalid_config() {
    let config = EngineConfig::with_capacity(0, 16);
    assert!(matches!(
        PhysicsEngine::initialize(config),
        Err(InitError::InvalidConfig(_))
    ));
}

#[test]
fn test_initialize_rejects_capacity_beyond_dispatch_limit() {
    let device = DeviceDescriptor {
        label: "small-device",
        worker_threads: 1,
        limits: Limits {
            max_compute_workgroups_per_dimension: 1,
            ..Limits::default()
        },
    };
    let result = PhysicsEngine::initialize_on(EngineConfig::with_capacity(65, 8), device);
    assert!(matches!(result, Err(InitError::PipelineCompilation { .. })));
}

#[test]
fn test_add_particles_returns_start_slots() {
    let mut engine = engine(100, 10);
    let t = ParticleTemplate::default().with_jitter(Vec3::splat(5.0));
    assert_eq!(engine.add_particles(10, &t).unwrap(), 0);
    assert_eq!(engine.add_particles(5, &t).unwrap(), 10);
    assert_eq!(engine.stats().particle_count, 15);
}

#[test]
fn test_capacity_failure_leaves_counts_unchanged() {
    let mut engine = engine(10, 2);
    let t = ParticleTemplate::default();
    engine.add_particles(8, &t).unwrap();
    assert_eq!(
        engine.add_particles(3, &t),
        Err(EngineError::CapacityExceeded { requested: 3, available: 2 })
    );
    assert_eq!(engine.stats().particle_count, 8);

    let three = [
        ConstraintSpec::new(0, 1, 1.0, 1.0),
        ConstraintSpec::new(1, 2, 1.0, 1.0),
        ConstraintSpec::new(2, 3, 1.0, 1.0),
    ];
    assert!(matches!(
        engine.add_constraints(&three),
        Err(EngineError::CapacityExceeded { requested: 3, available: 2 })
    ));
    assert_eq!(engine.stats().constraint_count, 0);

    // The remaining slots are still usable.
    assert_eq!(engine.add_particles(2, &t).unwrap(), 8);
}

#[test]
fn test_invalid_reference_writes_nothing() {
    let mut engine = engine(10, 10);
    engine.add_particles(3, &ParticleTemplate::default()).unwrap();
    let err = engine
        .add_constraints(&[ConstraintSpec::new(0, 1, 1.0, 1.0), ConstraintSpec::new(2, 3, 1.0, 1.0)])
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidReference { index: 1, slot: 3, occupied: 3 });
    assert_eq!(engine.stats().constraint_count, 0);
}

#[test]
fn test_invalid_template_rejected() {
    let mut engine = engine(10, 10);
    let bad = ParticleTemplate::default().with_radius(-1.0);
    assert!(matches!(
        engine.add_particles(1, &bad),
        Err(EngineError::InvalidTemplate(_))
    ));
    assert!(matches!(
        engine.add_particle_batch(&[ParticleTemplate::default(), bad]),
        Err(EngineError::InvalidTemplate(_))
    ));
    assert_eq!(engine.stats().particle_count, 0);
}

#[test]
fn test_jitter_is_deterministic_and_bounded() {
    let t = ParticleTemplate::at(Vec3::new(0.0, 50.0, 0.0)).with_jitter(Vec3::new(10.0, 0.0, 10.0));
    let mut a = engine(64, 1);
    let mut b = engine(64, 1);
    a.add_particles(64, &t).unwrap();
    b.add_particles(64, &t).unwrap();

    let pa = a.read_particles(0, 64).unwrap();
    let pb = b.read_particles(0, 64).unwrap();
    assert_eq!(pa, pb);
    for p in &pa {
        assert!(p.position[0].abs() <= 10.0 && p.position[2].abs() <= 10.0);
        assert_eq!(p.position[1], 50.0);
    }
}

#[test]
fn test_clear_is_idempotent() {
    let mut engine = engine(10, 10);
    engine.add_particles(4, &ParticleTemplate::default()).unwrap();
    engine.add_constraints(&[ConstraintSpec::new(0, 1, 1.0, 1.0)]).unwrap();

    engine.clear();
    engine.clear();
    let stats = engine.stats();
    assert_eq!(stats.particle_count, 0);
    assert_eq!(stats.constraint_count, 0);
    assert_eq!(stats.max_particles, 10);

    assert_eq!(engine.add_particles(10, &ParticleTemplate::default()).unwrap(), 0);
}

#[test]
fn test_stats_report_capacity_and_memory() {
    let mut engine = engine(1000, 100);
    engine.set_substeps(6);
    let stats = engine.stats();
    assert_eq!(stats.max_particles, 1000);
    assert_eq!(stats.max_constraints, 100);
    assert_eq!(stats.substeps, 6);
    assert!(stats.approximate_device_memory_mb > 0.0);
    assert_eq!(stats.update_time_ms, 0.0);
}

#[test]
fn test_setters_reject_invalid_values() {
    let mut engine = engine(10, 10);
    engine.set_gravity(Vec3::new(f32::NAN, 0.0, 0.0));
    assert_eq!(engine.simulation_config().gravity, Vec3::new(0.0, -9.81, 0.0));

    engine.set_global_damping(2.0);
    assert_eq!(engine.simulation_config().global_damping, 1.0);

    engine.set_bounds(Some(verlet_core::Bounds::new(Vec3::ONE, Vec3::ZERO, 0.5)));
    assert!(engine.simulation_config().bounds.is_none());
}

#[test]
fn test_lost_device_fails_every_operation() {
    let mut engine = engine(10, 10);
    engine.add_particles(2, &ParticleTemplate::default()).unwrap();
    engine.device().destroy();

    assert!(engine.update(1.0 / 60.0).is_err());
    assert!(matches!(
        engine.add_particles(1, &ParticleTemplate::default()),
        Err(EngineError::Device(_))
    ));
    assert!(matches!(engine.read_positions(1), Err(EngineError::Device(_))));
}
