use glam::Vec3;
use verlet_core::{EngineConfig, EngineError, ParticleTemplate, PhysicsEngine, SimulationDeviceError};

fn engine() -> PhysicsEngine {
    let mut config = EngineConfig::with_capacity(128, 8);
    config.simulation.global_damping = 0.0;
    config.simulation.collisions_enabled = false;
    PhysicsEngine::initialize(config).expect("engine init")
}

#[test]
fn test_readback_matches_particle_buffer() {
    let mut engine = engine();
    engine
        .add_particles(100, &ParticleTemplate::default().with_jitter(Vec3::splat(3.0)))
        .unwrap();
    engine.update(1.0 / 60.0).unwrap();

    let positions = engine.read_positions(100).unwrap().wait().unwrap();
    let particles = engine.read_particles(0, 100).unwrap();
    assert_eq!(positions.len(), 100);
    for (pos, p) in positions.iter().zip(&particles) {
        assert_eq!(*pos, p.position);
    }
}

#[test]
fn test_readback_observes_frame_completed_before_request() {
    let mut engine = engine();
    engine.add_particles(1, &ParticleTemplate::default()).unwrap();
    engine.update(0.1).unwrap();
    let before = engine.read_particles(0, 1).unwrap()[0].position;

    let handle = engine.read_positions(1).unwrap();
    engine.update(0.1).unwrap();
    let after = engine.read_particles(0, 1).unwrap()[0].position;

    assert_eq!(handle.wait().unwrap(), vec![before]);
    assert_ne!(before, after);
}

#[test]
fn test_handle_is_a_future() {
    let mut engine = engine();
    engine.add_particles(4, &ParticleTemplate::at(Vec3::ONE)).unwrap();
    let positions = pollster::block_on(engine.read_positions(4).unwrap()).unwrap();
    assert_eq!(positions, vec![[1.0; 3]; 4]);
}

#[test]
fn test_zero_count_readback() {
    let engine = engine();
    let handle = engine.read_positions(0).unwrap();
    assert!(handle.is_empty());
    assert!(handle.wait().unwrap().is_empty());
}

#[test]
fn test_readback_past_occupied_slots_fails() {
    let mut engine = engine();
    engine.add_particles(10, &ParticleTemplate::default()).unwrap();
    assert_eq!(
        engine.read_positions(11).err(),
        Some(EngineError::ReadbackOutOfRange { requested: 11, occupied: 10 })
    );
    assert!(matches!(
        engine.read_particles(5, 6),
        Err(EngineError::ReadbackOutOfRange { requested: 11, occupied: 10 })
    ));
}

#[test]
fn test_readback_on_lost_device() {
    let mut engine = engine();
    engine.add_particles(10, &ParticleTemplate::default()).unwrap();
    engine.device().destroy();
    assert_eq!(
        engine.read_positions(10).err(),
        Some(EngineError::Device(SimulationDeviceError::Lost))
    );
}
