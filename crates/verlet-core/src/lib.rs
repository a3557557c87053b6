//! Data-parallel Verlet particle engine.
//!
//! A [`PhysicsEngine`] owns a compute device (a dedicated worker pool),
//! fixed-capacity particle and constraint buffers, and three compute
//! pipelines run once per frame: Verlet integration, distance constraint
//! relaxation, and spatial-hash collision response.
//!
//! ```no_run
//! use glam::Vec3;
//! use verlet_core::{EngineConfig, ParticleTemplate, PhysicsEngine};
//!
//! let mut engine = PhysicsEngine::initialize(EngineConfig::with_capacity(1024, 256))?;
//! engine.add_particles(100, &ParticleTemplate::at(Vec3::Y * 10.0).with_jitter(Vec3::splat(5.0)))?;
//! engine.update(1.0 / 60.0)?;
//! let positions = engine.read_positions(100)?.wait()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod buffers;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod grid;
pub mod kernels;
pub mod math;
pub mod particle;
pub mod pipeline;
pub mod quality;
pub mod readback;
pub mod registry;
pub mod shapes;
pub mod stepper;

pub use config::{Bounds, EngineConfig, SimulationConfig};
pub use engine::{EngineStats, PhysicsEngine};
pub use error::{EngineError, EngineResult, InitError, SimulationDeviceError};
pub use particle::{ConstraintSpec, Particle, ParticleTemplate};
pub use readback::ReadbackHandle;
