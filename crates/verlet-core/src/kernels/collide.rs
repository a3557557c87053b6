use glam::Vec3;
use rayon::prelude::*;

use crate::buffers::BodySnapshot;
use crate::config::{MAX_CELL_CANDIDATES, WORKGROUP_SIZE};
use crate::grid::SpatialHashGrid;
use crate::particle::Particle;

pub const ENTRY_POINT: &str = "detect_collisions";

/// Below this separation the contact normal is undefined and the pair is skipped.
const MIN_CONTACT_DISTANCE: f32 = 1e-6;

/// Result counters of one collision pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Overlapping pairs resolved (each pair counted once).
    pub contacts: usize,
    /// Overlapping pairs skipped because the particles were coincident.
    pub degenerate: usize,
}

/// Outcome of testing one pair of particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Contact {
    /// Apart, or both anchored.
    None,
    /// Overlapping: move particle `i` by this much.
    Push(Vec3),
    /// Overlapping with coincident centres, so there is no normal.
    Degenerate,
}

/// Push of particle `i` (at `p_i`, inverse mass `w_i`) out of `other`, if they overlap.
#[inline]
pub fn contact_push(p_i: Vec3, r_i: f32, w_i: f32, other: &BodySnapshot) -> Contact {
    let delta = p_i - other.pos();
    let dist = delta.length();
    let min_dist = r_i + other.radius;
    if !(dist < min_dist) {
        return Contact::None;
    }
    if dist < MIN_CONTACT_DISTANCE {
        return Contact::Degenerate;
    }
    let w_sum = w_i + other.inv_mass;
    if w_sum <= 0.0 {
        return Contact::None;
    }
    let normal = delta / dist;
    let penetration = min_dist - dist;
    Contact::Push(normal * (penetration * w_i / w_sum))
}

/// Resolves overlaps between particles that share a spatial hash cell.
///
/// Builds `grid` from the snapshot, then every particle sums the pushes from
/// the (at most [`MAX_CELL_CANDIDATES`]) other particles in its cell and
/// writes its own new position.
pub fn collide(
    particles: &mut [Particle],
    snapshot: &mut [BodySnapshot],
    grid: &mut SpatialHashGrid,
) -> CollisionStats {
    let count = particles.len();
    super::take_snapshot(particles, snapshot);
    let snapshot = &snapshot[..count];
    grid.build_with(snapshot, count, BodySnapshot::pos);
    let grid = &*grid;

    let (contacts, degenerate) = particles
        .par_chunks_mut(WORKGROUP_SIZE)
        .enumerate()
        .map(|(group_id, group)| {
            let base = group_id * WORKGROUP_SIZE;
            let mut contacts = 0;
            let mut degenerate = 0;
            for (k, p) in group.iter_mut().enumerate() {
                let i = base + k;
                let me = &snapshot[i];
                let p_i = me.pos();
                let cell = grid.cell_of(i);
                let mut push = Vec3::ZERO;
                let mut tested = 0;

                for &j in grid.bucket(cell) {
                    let j = j as usize;
                    if j == i || grid.cell_of(j) != cell {
                        continue;
                    }
                    if tested == MAX_CELL_CANDIDATES {
                        break;
                    }
                    tested += 1;
                    match contact_push(p_i, me.radius, me.inv_mass, &snapshot[j]) {
                        Contact::Push(d) => {
                            push += d;
                            contacts += 1;
                        }
                        Contact::None => {}
                        Contact::Degenerate => degenerate += 1,
                    }
                }

                if me.inv_mass == 0.0 || push == Vec3::ZERO {
                    continue;
                }
                let next = p_i + push;
                if next.is_finite() {
                    p.position = next.to_array();
                }
            }
            (contacts, degenerate)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    // Every overlapping pair is seen from both sides.
    CollisionStats {
        contacts: contacts / 2,
        degenerate: degenerate / 2,
    }
}
