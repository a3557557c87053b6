use glam::Vec3;
use rayon::prelude::*;

use crate::config::WORKGROUP_SIZE;
use crate::particle::{FrameUniforms, Particle};

pub const ENTRY_POINT: &str = "integrate";

/// Verlet step for every particle in `particles`.
///
/// Returns the number of particles whose update was non-finite and was
/// discarded (the particle is left in place with zero velocity).
pub fn integrate(particles: &mut [Particle], uniforms: &FrameUniforms) -> usize {
    particles
        .par_chunks_mut(WORKGROUP_SIZE)
        .map(|group| {
            group
                .iter_mut()
                .map(|p| usize::from(!integrate_one(p, uniforms)))
                .sum::<usize>()
        })
        .sum()
}

/// Integrates one particle. Returns `false` if the result was non-finite and discarded.
#[inline]
pub fn integrate_one(p: &mut Particle, u: &FrameUniforms) -> bool {
    if p.is_anchored() {
        return true;
    }

    let pos = p.pos();
    let gravity = Vec3::from_array(u.gravity);
    let velocity = (pos - p.prev()) * (1.0 - u.global_damping) * (1.0 - p.damping);
    let mut next = pos + velocity + gravity * (u.dt * u.dt);

    if !next.is_finite() {
        p.previous = p.position;
        return false;
    }

    // Previous position is what the next frame's velocity is measured against.
    let mut prev = pos;
    if u.bounds_enabled != 0 {
        let min = Vec3::from_array(u.bounds_min);
        let max = Vec3::from_array(u.bounds_max);
        let travel = next - pos;
        for axis in 0..3 {
            if next[axis] < min[axis] {
                next[axis] = min[axis];
                prev[axis] = next[axis] + travel[axis] * u.restitution;
            } else if next[axis] > max[axis] {
                next[axis] = max[axis];
                prev[axis] = next[axis] + travel[axis] * u.restitution;
            }
        }
    }

    p.previous = prev.to_array();
    p.position = next.to_array();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleTemplate;

    fn uniforms(gravity: Vec3, dt: f32) -> FrameUniforms {
        FrameUniforms {
            gravity: gravity.to_array(),
            dt,
            ..FrameUniforms::default()
        }
    }

    #[test]
    fn test_constant_velocity_without_forces() {
        let mut p = ParticleTemplate::default()
            .with_velocity(Vec3::new(1.0, 0.0, 0.0))
            .instantiate(0);
        let u = uniforms(Vec3::ZERO, 1.0 / 60.0);
        integrate_one(&mut p, &u);
        integrate_one(&mut p, &u);
        assert!((p.pos().x - 2.0).abs() < 1e-5);
        assert!((p.velocity().x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_anchored_particle_ignores_gravity() {
        let mut p = ParticleTemplate::default().pinned().instantiate(0);
        let u = uniforms(Vec3::new(0.0, -9.81, 0.0), 0.1);
        integrate_one(&mut p, &u);
        assert_eq!(p.pos(), Vec3::ZERO);
    }

    #[test]
    fn test_non_finite_update_discarded() {
        let mut p = ParticleTemplate::at(Vec3::ONE).instantiate(0);
        let u = uniforms(Vec3::new(f32::INFINITY, 0.0, 0.0), 1.0);
        assert!(!integrate_one(&mut p, &u));
        assert_eq!(p.pos(), Vec3::ONE);
        assert_eq!(p.velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_bounds_reflect_velocity() {
        let mut p = ParticleTemplate::at(Vec3::new(0.0, 0.5, 0.0))
            .with_velocity(Vec3::new(0.0, -1.0, 0.0))
            .instantiate(0);
        let u = FrameUniforms {
            bounds_enabled: 1,
            bounds_min: [-10.0, 0.0, -10.0],
            bounds_max: [10.0, 10.0, 10.0],
            restitution: 0.5,
            ..uniforms(Vec3::ZERO, 1.0 / 60.0)
        };
        integrate_one(&mut p, &u);
        assert_eq!(p.pos().y, 0.0);
        assert!((p.velocity().y - 0.5).abs() < 1e-5, "velocity {:?}", p.velocity());
    }

    #[test]
    fn test_parallel_integrate_counts_discarded() {
        let mut particles: Vec<Particle> =
            (0..200).map(|i| ParticleTemplate::default().instantiate(i)).collect();
        particles[150].position = [f32::NAN, 0.0, 0.0];
        let discarded = integrate(&mut particles, &uniforms(Vec3::new(0.0, -1.0, 0.0), 0.1));
        assert_eq!(discarded, 1);
        assert!((particles[0].pos().y + 0.01).abs() < 1e-6);
    }
}
