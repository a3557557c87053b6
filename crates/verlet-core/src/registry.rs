//! Slot bookkeeping for particles and constraints.
//!
//! The registry owns the two high-water marks. Every append is validated in
//! full before the buffer store is touched, so a failed call leaves both the
//! marks and the buffers exactly as they were.

use rayon::prelude::*;

use crate::buffers::BufferStore;
use crate::error::{BufferError, EngineError, EngineResult};
use crate::particle::{ConstraintRecord, ConstraintSpec, Particle, ParticleTemplate};

#[derive(Debug)]
pub struct ParticleRegistry {
    max_particles: u32,
    max_constraints: u32,
    particle_count: u32,
    constraint_count: u32,
    /// Set when the incidence table no longer matches the occupied slots.
    topology_dirty: bool,
}

impl ParticleRegistry {
    pub fn new(max_particles: u32, max_constraints: u32) -> Self {
        Self {
            max_particles,
            max_constraints,
            particle_count: 0,
            constraint_count: 0,
            topology_dirty: false,
        }
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn constraint_count(&self) -> u32 {
        self.constraint_count
    }

    pub fn free_particle_slots(&self) -> u32 {
        self.max_particles - self.particle_count
    }

    pub fn free_constraint_slots(&self) -> u32 {
        self.max_constraints - self.constraint_count
    }

    fn reserve_particles(&self, requested: usize) -> EngineResult<()> {
        let available = self.free_particle_slots();
        if requested > available as usize {
            return Err(EngineError::CapacityExceeded {
                requested: u32::try_from(requested).unwrap_or(u32::MAX),
                available,
            });
        }
        Ok(())
    }

    /// Spawns `count` particles from one template. Returns the first new slot.
    pub fn add_particles(
        &mut self,
        store: &BufferStore,
        count: u32,
        template: &ParticleTemplate,
    ) -> EngineResult<u32> {
        template.validate().map_err(EngineError::InvalidTemplate)?;
        self.reserve_particles(count as usize)?;
        let start = self.particle_count;
        if count == 0 {
            return Ok(start);
        }

        let records: Vec<Particle> = (start..start + count)
            .into_par_iter()
            .map(|slot| template.instantiate(slot))
            .collect();
        self.commit_particles(store, &records)?;

        tracing::debug!(start, count, "particles added");
        Ok(start)
    }

    /// Spawns one particle per template. Returns the first new slot.
    pub fn add_particle_batch(
        &mut self,
        store: &BufferStore,
        templates: &[ParticleTemplate],
    ) -> EngineResult<u32> {
        for t in templates {
            t.validate().map_err(EngineError::InvalidTemplate)?;
        }
        self.reserve_particles(templates.len())?;
        let start = self.particle_count;
        if templates.is_empty() {
            return Ok(start);
        }

        let records: Vec<Particle> = templates
            .iter()
            .zip(start..)
            .map(|(t, slot)| t.instantiate(slot))
            .collect();
        self.commit_particles(store, &records)?;

        tracing::debug!(start, count = records.len(), "particle batch added");
        Ok(start)
    }

    fn commit_particles(&mut self, store: &BufferStore, records: &[Particle]) -> EngineResult<()> {
        store
            .particles
            .write_range(self.particle_count as usize, records)?;
        self.particle_count += records.len() as u32;
        self.topology_dirty = true;
        Ok(())
    }

    /// Appends distance constraints between occupied particles.
    pub fn add_constraints(
        &mut self,
        store: &BufferStore,
        specs: &[ConstraintSpec],
    ) -> EngineResult<()> {
        let occupied = self.particle_count;
        for (index, spec) in specs.iter().enumerate() {
            validate_constraint(index, spec, occupied)?;
        }
        let available = self.free_constraint_slots();
        if specs.len() > available as usize {
            return Err(EngineError::CapacityExceeded {
                requested: u32::try_from(specs.len()).unwrap_or(u32::MAX),
                available,
            });
        }
        if specs.is_empty() {
            return Ok(());
        }

        let records = {
            let particles = store.particles.read()?;
            specs
                .iter()
                .map(|spec| {
                    let rest_length = spec.rest_length.unwrap_or_else(|| {
                        let a = particles[spec.a as usize].pos();
                        let b = particles[spec.b as usize].pos();
                        a.distance(b)
                    });
                    ConstraintRecord {
                        a: spec.a,
                        b: spec.b,
                        rest_length,
                        stiffness: spec.stiffness,
                    }
                })
                .collect::<Vec<_>>()
        };
        // A rest length taken from non-finite positions would poison the solver.
        if let Some(index) = records.iter().position(|r| !r.rest_length.is_finite()) {
            return Err(EngineError::InvalidConstraint {
                index,
                reason: "rest length resolved from current positions is not finite",
            });
        }

        store
            .constraints
            .write_range(self.constraint_count as usize, &records)?;
        let start = self.constraint_count;
        self.constraint_count += records.len() as u32;
        self.topology_dirty = true;

        tracing::debug!(start, count = records.len(), "constraints added");
        Ok(())
    }

    /// Resets both high-water marks. Buffers keep their stale contents.
    pub fn clear(&mut self) {
        if self.particle_count != 0 || self.constraint_count != 0 {
            tracing::debug!(
                particles = self.particle_count,
                constraints = self.constraint_count,
                "registry cleared"
            );
        }
        self.particle_count = 0;
        self.constraint_count = 0;
        self.topology_dirty = true;
    }

    /// Rebuilds the particle → constraint incidence table if the occupied
    /// slots changed since the last call.
    pub(crate) fn sync_incidence(&mut self, store: &mut BufferStore) -> Result<(), BufferError> {
        if !self.topology_dirty {
            return Ok(());
        }
        let constraints = store.constraints.read()?;
        store.incidence.rebuild(
            &constraints[..self.constraint_count as usize],
            self.particle_count as usize,
        );
        drop(constraints);
        self.topology_dirty = false;
        Ok(())
    }
}

pub(crate) fn validate_constraint(index: usize, spec: &ConstraintSpec, occupied: u32) -> EngineResult<()> {
    for slot in [spec.a, spec.b] {
        if slot >= occupied {
            return Err(EngineError::InvalidReference {
                index,
                slot,
                occupied,
            });
        }
    }
    let reason = if spec.a == spec.b {
        Some("endpoints must be distinct particles")
    } else if !(0.0..=1.0).contains(&spec.stiffness) {
        Some("stiffness must be in [0, 1]")
    } else if matches!(spec.rest_length, Some(r) if !(r.is_finite() && r >= 0.0)) {
        Some("rest length must be finite and non-negative")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(EngineError::InvalidConstraint { index, reason }),
        None => Ok(()),
    }
}
