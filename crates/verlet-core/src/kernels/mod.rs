//! Compute programs.
//!
//! Each kernel processes its domain in workgroups of [`WORKGROUP_SIZE`]
//! invocations. Workgroups run concurrently on the device pool; kernels
//! read neighbours from a [`BodySnapshot`] copy and write only their own
//! element, so results do not depend on scheduling.
//!
//! [`WORKGROUP_SIZE`]: crate::config::WORKGROUP_SIZE
//! [`BodySnapshot`]: crate::buffers::BodySnapshot

pub mod collide;
pub mod constraints;
pub mod integrate;

use rayon::prelude::*;

use crate::buffers::BodySnapshot;
use crate::config::WORKGROUP_SIZE;
use crate::particle::Particle;

/// Entry points available to [`crate::pipeline::ComputePipeline::compile`].
pub const ENTRY_POINTS: &[&str] = &[
    integrate::ENTRY_POINT,
    constraints::ENTRY_POINT,
    collide::ENTRY_POINT,
];

/// Copies the state other invocations need to read into `snapshot`.
pub(crate) fn take_snapshot(particles: &[Particle], snapshot: &mut [BodySnapshot]) {
    snapshot[..particles.len()]
        .par_chunks_mut(WORKGROUP_SIZE)
        .zip(particles.par_chunks(WORKGROUP_SIZE))
        .for_each(|(out, group)| {
            for (s, p) in out.iter_mut().zip(group) {
                *s = BodySnapshot {
                    position: p.position,
                    inv_mass: p.inv_mass,
                    radius: p.radius,
                    _pad: [0.0; 3],
                };
            }
        });
}
