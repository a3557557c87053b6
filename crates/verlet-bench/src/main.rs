use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use glam::Vec3;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use verlet_core::quality::AdaptiveQuality;
use verlet_core::shapes::Shape;
use verlet_core::{Bounds, EngineConfig, ParticleTemplate, PhysicsEngine};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scene {
    /// Loose particles dropped into a box
    Rain,
    /// A sheet of cloth pinned along its top edge
    Cloth,
    /// Ropes hanging from a row of anchors
    Ropes,
}

/// Headless driver for the Verlet particle engine
#[derive(Parser, Debug)]
#[command(name = "verlet-bench")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scene to simulate
    #[arg(short, long, value_enum, default_value = "rain")]
    scene: Scene,

    /// Particle count for the rain scene; sizes the other scenes roughly
    #[arg(short, long, default_value = "100000")]
    particles: u32,

    /// Frames to simulate
    #[arg(short, long, default_value = "300")]
    frames: u32,

    /// Constraint passes per frame
    #[arg(long, default_value = "4")]
    substeps: u32,

    /// Frame time step in seconds
    #[arg(long, default_value = "0.016666668")]
    dt: f32,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Disable particle-particle collisions
    #[arg(long)]
    no_collisions: bool,

    /// Adapt substeps to keep frames under this budget (ms)
    #[arg(long)]
    budget_ms: Option<f32>,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Engine capacities for a run of `particles`: two constraint slots per particle.
fn capacities(particles: u32) -> (u32, u32) {
    let particles = particles.max(1);
    (particles, particles.saturating_mul(2))
}

fn build_scene(engine: &mut PhysicsEngine, scene: Scene, particles: u32) -> anyhow::Result<()> {
    match scene {
        Scene::Rain => {
            let template = ParticleTemplate::at(Vec3::new(0.0, 150.0, 0.0))
                .with_jitter(Vec3::new(90.0, 40.0, 90.0))
                .with_radius(0.5)
                .with_damping(0.001);
            engine.add_particles(particles, &template)?;
        }
        Scene::Cloth => {
            let side = (particles as f32).sqrt().max(2.0) as u32;
            let cloth = Shape::cloth(
                Vec3::new(-(side as f32) * 0.5, 100.0, 0.0),
                side,
                side,
                1.0,
                1.0,
                true,
                ParticleTemplate::default().with_radius(0.4),
            );
            cloth.spawn(engine)?;
        }
        Scene::Ropes => {
            let segments = 50;
            let ropes = (particles / (segments + 1)).max(1);
            for i in 0..ropes {
                let x = (i as f32 - ropes as f32 * 0.5) * 2.0;
                let rope = Shape::rope(
                    Vec3::new(x, 100.0, 0.0),
                    Vec3::X,
                    segments,
                    50.0,
                    1.0,
                    ParticleTemplate::default().with_radius(0.3),
                );
                rope.spawn(engine)?;
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("verlet-bench v{}", env!("CARGO_PKG_VERSION"));

    let (max_particles, max_constraints) = capacities(cli.particles);
    let mut config = EngineConfig::with_capacity(max_particles, max_constraints);
    config.worker_threads = cli.threads;
    config.simulation.substeps = cli.substeps;
    config.simulation.collisions_enabled = !cli.no_collisions;
    config.simulation.bounds = Some(Bounds::new(
        Vec3::new(-100.0, 0.0, -100.0),
        Vec3::new(100.0, 250.0, 100.0),
        0.3,
    ));

    let mut engine = PhysicsEngine::initialize(config).context("failed to initialize engine")?;
    build_scene(&mut engine, cli.scene, cli.particles).context("failed to build scene")?;

    let mut quality = cli.budget_ms.map(|budget| {
        let mut q = AdaptiveQuality::new(cli.substeps);
        q.budget_ms = budget;
        q
    });

    let start = Instant::now();
    let mut worst_ms: f32 = 0.0;
    for frame in 0..cli.frames {
        engine.update(cli.dt)?;
        let stats = engine.stats();
        worst_ms = worst_ms.max(stats.update_time_ms);

        if let Some(q) = quality.as_mut() {
            engine.set_substeps(q.record(stats.update_time_ms));
        }
        if frame % 60 == 0 {
            let last = engine.last_frame();
            info!(
                frame,
                update_ms = stats.update_time_ms,
                substeps = stats.substeps,
                contacts = last.contacts,
                "frame"
            );
        }
    }
    let elapsed = start.elapsed();

    let stats = engine.stats();
    let positions = engine.read_positions(stats.particle_count)?.wait()?;
    let (min, max) = positions.iter().map(|p| Vec3::from_array(*p)).fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(lo, hi), p| (lo.min(p), hi.max(p)),
    );

    info!(
        particles = stats.particle_count,
        constraints = stats.constraint_count,
        frames = cli.frames,
        avg_ms = elapsed.as_secs_f32() * 1000.0 / cli.frames.max(1) as f32,
        worst_ms,
        device_mb = stats.approximate_device_memory_mb,
        "done"
    );
    info!(?min, ?max, "particle bounds");
    Ok(())
}
