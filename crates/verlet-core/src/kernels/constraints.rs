use glam::Vec3;
use rayon::prelude::*;

use crate::buffers::{BodySnapshot, ConstraintCorrection, IncidenceTable};
use crate::config::WORKGROUP_SIZE;
use crate::particle::{ConstraintRecord, Particle};

pub const ENTRY_POINT: &str = "solve_constraints";

/// Position corrections `(delta_a, delta_b)` for one distance constraint.
///
/// `delta = p_b - p_a`, `c = delta * ((rest - dist) / dist) * stiffness * 0.5`,
/// then `a` moves by `-c * w_a` and `b` by `+c * w_b`. Returns `None` for a
/// degenerate (zero or non-finite length) constraint.
#[inline]
pub fn constraint_correction(
    c: &ConstraintRecord,
    p_a: Vec3,
    p_b: Vec3,
    w_a: f32,
    w_b: f32,
) -> Option<(Vec3, Vec3)> {
    let delta = p_b - p_a;
    let dist = delta.length();
    if dist == 0.0 || !dist.is_finite() {
        return None;
    }
    let correction = delta * ((c.rest_length - dist) / dist * c.stiffness * 0.5);
    Some((-correction * w_a, correction * w_b))
}

/// One relaxation pass over all `constraints`.
///
/// The pass is double-buffered: every constraint computes its endpoint
/// corrections from the same snapshot, then each particle gathers the
/// corrections of its incident constraints through `incidence` and moves by
/// their sum scaled by [`IncidenceTable::relaxation`]. The scale is the same
/// for every particle, so both endpoints of a constraint keep the
/// `w_a : w_b` split and the centre of mass of a free body does not drift.
/// Returns the number of degenerate constraints skipped.
pub fn solve_pass(
    particles: &mut [Particle],
    snapshot: &mut [BodySnapshot],
    constraints: &[ConstraintRecord],
    corrections: &mut [ConstraintCorrection],
    incidence: &IncidenceTable,
) -> usize {
    super::take_snapshot(particles, snapshot);
    let snapshot = &snapshot[..particles.len()];

    let skipped = corrections[..constraints.len()]
        .par_chunks_mut(WORKGROUP_SIZE)
        .zip(constraints.par_chunks(WORKGROUP_SIZE))
        .map(|(out, group)| {
            let mut skipped = 0;
            for (corr, c) in out.iter_mut().zip(group) {
                let a = &snapshot[c.a as usize];
                let b = &snapshot[c.b as usize];
                *corr = match constraint_correction(c, a.pos(), b.pos(), a.inv_mass, b.inv_mass) {
                    Some((da, db)) => ConstraintCorrection {
                        delta_a: da.to_array(),
                        active: 1,
                        delta_b: db.to_array(),
                        _pad: 0,
                    },
                    None => {
                        skipped += 1;
                        ConstraintCorrection::default()
                    }
                };
            }
            skipped
        })
        .sum::<usize>();

    let corrections = &corrections[..constraints.len()];
    let relaxation = incidence.relaxation();
    particles
        .par_chunks_mut(WORKGROUP_SIZE)
        .enumerate()
        .for_each(|(group_id, group)| {
            let base = group_id * WORKGROUP_SIZE;
            for (k, p) in group.iter_mut().enumerate() {
                if p.is_anchored() {
                    continue;
                }
                let i = base + k;
                let mut sum = Vec3::ZERO;
                let mut touched = false;
                for &entry in incidence.incident(i) {
                    let corr = &corrections[(entry >> 1) as usize];
                    if corr.active == 0 {
                        continue;
                    }
                    sum += Vec3::from_array(if entry & 1 == 0 {
                        corr.delta_a
                    } else {
                        corr.delta_b
                    });
                    touched = true;
                }
                if !touched {
                    continue;
                }
                let next = snapshot[i].pos() + sum * relaxation;
                if next.is_finite() {
                    p.position = next.to_array();
                }
            }
        });

    skipped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rest_length: f32, stiffness: f32) -> ConstraintRecord {
        ConstraintRecord {
            a: 0,
            b: 1,
            rest_length,
            stiffness,
        }
    }

    #[test]
    fn test_correction_weighted_by_inverse_mass() {
        let c = record(1.0, 1.0);
        let (da, db) =
            constraint_correction(&c, Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), 1.0, 0.5).unwrap();
        // c = (3,0,0) * (-2/3) * 0.5 = (-1,0,0)
        assert!((da - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6);
        assert!((db - Vec3::new(-0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_zero_length_constraint_skipped() {
        let c = record(1.0, 1.0);
        assert!(constraint_correction(&c, Vec3::ONE, Vec3::ONE, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_stiffness_scales_correction() {
        let soft = record(1.0, 0.25);
        let rigid = record(1.0, 1.0);
        let b = Vec3::new(2.0, 0.0, 0.0);
        let (_, db_soft) = constraint_correction(&soft, Vec3::ZERO, b, 1.0, 1.0).unwrap();
        let (_, db_rigid) = constraint_correction(&rigid, Vec3::ZERO, b, 1.0, 1.0).unwrap();
        assert!((db_soft * 4.0 - db_rigid).length() < 1e-6);
    }
}
