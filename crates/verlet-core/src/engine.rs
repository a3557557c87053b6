//! The engine instance and its public operations.

use glam::Vec3;

use crate::buffers::BufferStore;
use crate::config::{Bounds, EngineConfig, SimulationConfig};
use crate::device::{Device, DeviceDescriptor};
use crate::error::{EngineError, EngineResult, InitError, SimulationDeviceError};
use crate::particle::{ConstraintSpec, Particle, ParticleTemplate};
use crate::pipeline::PipelineManager;
use crate::readback::{ReadbackHandle, ReadbackQueue};
use crate::registry::ParticleRegistry;
use crate::stepper::{self, FrameExtent, FrameReport};

const BYTES_PER_MIB: f32 = 1024.0 * 1024.0;

/// Snapshot of engine counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineStats {
    pub particle_count: u32,
    pub constraint_count: u32,
    /// Wall time of the last `update`, in milliseconds.
    pub update_time_ms: f32,
    /// Capacity allocated for device buffers, in MiB.
    pub approximate_device_memory_mb: f32,
    pub max_particles: u32,
    pub max_constraints: u32,
    pub substeps: u32,
}

/// A data-parallel Verlet particle simulation.
///
/// Owns its compute device and every buffer. Capacities are fixed by the
/// [`EngineConfig`] passed to [`PhysicsEngine::initialize`].
pub struct PhysicsEngine {
    config: EngineConfig,
    simulation: SimulationConfig,
    device: Device,
    store: BufferStore,
    pipelines: PipelineManager,
    registry: ParticleRegistry,
    readbacks: ReadbackQueue,
    last_frame: FrameReport,
}

impl PhysicsEngine {
    /// Creates the device, allocates every buffer and compiles the compute pipelines.
    pub fn initialize(config: EngineConfig) -> Result<Self, InitError> {
        let device = DeviceDescriptor {
            label: "verlet",
            worker_threads: config.worker_threads,
            ..DeviceDescriptor::default()
        };
        Self::initialize_on(config, device)
    }

    /// Like [`initialize`](Self::initialize), with explicit device settings.
    pub fn initialize_on(config: EngineConfig, device: DeviceDescriptor) -> Result<Self, InitError> {
        config.validate()?;
        let device = Device::new(&device)?;
        let store = BufferStore::new(&device, &config)?;
        let pipelines = PipelineManager::compile(&device, &store)?;

        tracing::info!(
            max_particles = config.max_particles,
            max_constraints = config.max_constraints,
            cell_size = config.spatial_hash_cell_size,
            table_size = config.spatial_hash_table_size,
            threads = device.worker_threads(),
            "physics engine initialized"
        );

        Ok(Self {
            simulation: config.simulation.clone(),
            registry: ParticleRegistry::new(config.max_particles, config.max_constraints),
            config,
            device,
            store,
            pipelines,
            readbacks: ReadbackQueue::default(),
            last_frame: FrameReport::default(),
        })
    }

    /// Spawns `count` particles from `template` at the particle high-water mark.
    ///
    /// Returns the slot of the first new particle.
    pub fn add_particles(&mut self, count: u32, template: &ParticleTemplate) -> EngineResult<u32> {
        self.device.ensure_alive()?;
        self.readbacks.fence();
        self.registry.add_particles(&self.store, count, template)
    }

    /// Spawns one particle per template. Returns the slot of the first one.
    pub fn add_particle_batch(&mut self, templates: &[ParticleTemplate]) -> EngineResult<u32> {
        self.device.ensure_alive()?;
        self.readbacks.fence();
        self.registry.add_particle_batch(&self.store, templates)
    }

    /// Appends distance constraints. Nothing is written unless every one is valid.
    pub fn add_constraints(&mut self, constraints: &[ConstraintSpec]) -> EngineResult<()> {
        self.device.ensure_alive()?;
        self.readbacks.fence();
        self.registry.add_constraints(&self.store, constraints)
    }

    /// Advances the simulation by `dt` seconds with the configured substep count.
    pub fn update(&mut self, dt: f32) -> Result<(), SimulationDeviceError> {
        self.update_with_substeps(dt, self.simulation.substeps)
    }

    /// Advances the simulation by `dt` seconds with `substeps` constraint passes.
    pub fn update_with_substeps(&mut self, dt: f32, substeps: u32) -> Result<(), SimulationDeviceError> {
        self.readbacks.fence();
        let result = self.step(dt, substeps);
        match result {
            Ok(report) => {
                self.last_frame = report;
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "frame failed");
                self.device.destroy();
                Err(err)
            }
        }
    }

    fn step(&mut self, dt: f32, substeps: u32) -> Result<FrameReport, SimulationDeviceError> {
        self.device.ensure_alive()?;
        self.registry
            .sync_incidence(&mut self.store)
            .map_err(|_| SimulationDeviceError::Lost)?;
        let extent = FrameExtent {
            particles: self.registry.particle_count(),
            constraints: self.registry.constraint_count(),
        };
        stepper::run_frame(
            &self.device,
            &self.pipelines,
            &mut self.store,
            extent,
            &self.simulation,
            dt,
            substeps,
        )
    }

    /// Starts copying positions `[0, count)` back to the host.
    pub fn read_positions(&self, count: u32) -> EngineResult<ReadbackHandle> {
        let occupied = self.registry.particle_count();
        if count > occupied {
            return Err(EngineError::ReadbackOutOfRange {
                requested: count,
                occupied,
            });
        }
        Ok(self
            .readbacks
            .submit(&self.device, self.store.particles.share(), count)?)
    }

    /// Copies full particle records `[start, start + count)`.
    pub fn read_particles(&self, start: u32, count: u32) -> EngineResult<Vec<Particle>> {
        self.device.ensure_alive()?;
        let occupied = self.registry.particle_count();
        let end = start.checked_add(count).filter(|&end| end <= occupied);
        match end {
            Some(_) => Ok(self.store.particles.read_range(start as usize, count as usize)?),
            None => Err(EngineError::ReadbackOutOfRange {
                requested: start.saturating_add(count),
                occupied,
            }),
        }
    }

    /// Forgets every particle and constraint. Capacity is kept.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.last_frame = FrameReport::default();
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            particle_count: self.registry.particle_count(),
            constraint_count: self.registry.constraint_count(),
            update_time_ms: self.last_frame.total_ms,
            approximate_device_memory_mb: self.store.allocated_bytes() as f32 / BYTES_PER_MIB,
            max_particles: self.config.max_particles,
            max_constraints: self.config.max_constraints,
            substeps: self.simulation.substeps,
        }
    }

    /// Per-stage details of the last completed `update`.
    pub fn last_frame(&self) -> &FrameReport {
        &self.last_frame
    }

    pub fn simulation_config(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Non-finite gravity is ignored.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        if gravity.is_finite() {
            self.simulation.gravity = gravity;
        } else {
            tracing::warn!(?gravity, "ignoring non-finite gravity");
        }
    }

    /// Constraint passes per frame. 0 disables constraint solving.
    pub fn set_substeps(&mut self, substeps: u32) {
        self.simulation.substeps = substeps;
    }

    /// Clamped to [0, 1]; non-finite values are ignored.
    pub fn set_global_damping(&mut self, damping: f32) {
        if damping.is_finite() {
            self.simulation.global_damping = damping.clamp(0.0, 1.0);
        } else {
            tracing::warn!(damping, "ignoring non-finite global damping");
        }
    }

    pub fn set_collisions_enabled(&mut self, enabled: bool) {
        self.simulation.collisions_enabled = enabled;
    }

    /// Invalid bounds (non-finite, inverted, restitution outside [0, 1]) are ignored.
    pub fn set_bounds(&mut self, bounds: Option<Bounds>) {
        let candidate = SimulationConfig {
            bounds,
            ..self.simulation.clone()
        };
        match candidate.validate() {
            Ok(()) => self.simulation = candidate,
            Err(reason) => tracing::warn!(reason, "ignoring invalid bounds"),
        }
    }
}

impl std::fmt::Debug for PhysicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngine")
            .field("device", &self.device)
            .field("registry", &self.registry)
            .field("simulation", &self.simulation)
            .finish_non_exhaustive()
    }
}
