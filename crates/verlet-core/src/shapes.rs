//! Scene builders: ropes, cloth sheets and braced boxes.
//!
//! A [`Shape`] is a list of particle templates plus constraints indexed
//! relative to the shape's first particle. [`Shape::spawn`] checks that both
//! fit before writing anything, so a shape is added whole or not at all.

use glam::Vec3;

use crate::engine::PhysicsEngine;
use crate::error::{EngineError, EngineResult};
use crate::particle::{ConstraintSpec, ParticleTemplate};
use crate::registry::validate_constraint;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    pub particles: Vec<ParticleTemplate>,
    /// Endpoints are indices into `particles`.
    pub constraints: Vec<ConstraintSpec>,
}

impl Shape {
    /// A chain of `segments + 1` particles from `start` along `direction`.
    ///
    /// The first particle is pinned. Links have rest length `length / segments`.
    pub fn rope(
        start: Vec3,
        direction: Vec3,
        segments: u32,
        length: f32,
        stiffness: f32,
        template: ParticleTemplate,
    ) -> Self {
        let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let segments = segments.max(1);
        let link = length / segments as f32;

        let particles = (0..=segments)
            .map(|i| {
                let p = ParticleTemplate {
                    position: start + dir * (link * i as f32),
                    ..template
                };
                if i == 0 {
                    p.pinned()
                } else {
                    p
                }
            })
            .collect();
        let constraints = (1..=segments)
            .map(|i| ConstraintSpec::new(i - 1, i, link, stiffness))
            .collect();

        Self {
            particles,
            constraints,
        }
    }

    /// A `columns` × `rows` sheet hanging from `origin` in the XY plane, rows going down.
    ///
    /// Neighbours are linked horizontally and vertically. With `pin_top_row`
    /// the first row is anchored.
    pub fn cloth(
        origin: Vec3,
        columns: u32,
        rows: u32,
        spacing: f32,
        stiffness: f32,
        pin_top_row: bool,
        template: ParticleTemplate,
    ) -> Self {
        let idx = |x: u32, y: u32| y * columns + x;
        let mut particles = Vec::with_capacity((columns * rows) as usize);
        let mut constraints = Vec::new();

        for y in 0..rows {
            for x in 0..columns {
                let mut p = ParticleTemplate {
                    position: origin + Vec3::new(x as f32 * spacing, -(y as f32) * spacing, 0.0),
                    ..template
                };
                if pin_top_row && y == 0 {
                    p = p.pinned();
                }
                particles.push(p);

                if x > 0 {
                    constraints.push(ConstraintSpec::new(idx(x - 1, y), idx(x, y), spacing, stiffness));
                }
                if y > 0 {
                    constraints.push(ConstraintSpec::new(idx(x, y - 1), idx(x, y), spacing, stiffness));
                }
            }
        }

        Self {
            particles,
            constraints,
        }
    }

    /// The eight corners of an axis-aligned box, with its twelve edges and
    /// four body diagonals as braces.
    ///
    /// Rest lengths are taken from the corner positions when spawned.
    pub fn cuboid(min: Vec3, size: Vec3, stiffness: f32, template: ParticleTemplate) -> Self {
        let particles = (0..8u32)
            .map(|corner| {
                let offset = Vec3::new(
                    (corner & 1) as f32,
                    ((corner >> 1) & 1) as f32,
                    ((corner >> 2) & 1) as f32,
                );
                ParticleTemplate {
                    position: min + offset * size,
                    ..template
                }
            })
            .collect();

        let mut constraints = Vec::with_capacity(16);
        for a in 0..8u32 {
            for axis in [1, 2, 4] {
                if a & axis == 0 {
                    constraints.push(ConstraintSpec::between(a, a | axis, stiffness));
                }
            }
        }
        for a in 0..4u32 {
            constraints.push(ConstraintSpec::between(a, 7 - a, stiffness));
        }

        Self {
            particles,
            constraints,
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Adds the shape to `engine`. Returns the slot of its first particle.
    pub fn spawn(&self, engine: &mut PhysicsEngine) -> EngineResult<u32> {
        let local = u32::try_from(self.particles.len()).unwrap_or(u32::MAX);
        for (index, c) in self.constraints.iter().enumerate() {
            validate_constraint(index, c, local)?;
        }
        let stats = engine.stats();
        let free = stats.max_constraints - stats.constraint_count;
        if self.constraints.len() > free as usize {
            return Err(EngineError::CapacityExceeded {
                requested: u32::try_from(self.constraints.len()).unwrap_or(u32::MAX),
                available: free,
            });
        }

        let base = engine.add_particle_batch(&self.particles)?;
        let constraints: Vec<ConstraintSpec> = self
            .constraints
            .iter()
            .map(|c| ConstraintSpec {
                a: c.a + base,
                b: c.b + base,
                ..*c
            })
            .collect();
        engine.add_constraints(&constraints)?;

        tracing::debug!(
            base,
            particles = self.particles.len(),
            constraints = constraints.len(),
            "shape spawned"
        );
        Ok(base)
    }
}
