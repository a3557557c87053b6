//! Frame encoding: integrate, relax constraints, resolve collisions.

use std::time::Instant;

use crate::buffers::BufferStore;
use crate::config::SimulationConfig;
use crate::device::Device;
use crate::error::SimulationDeviceError;
use crate::kernels::{collide, constraints, integrate};
use crate::particle::FrameUniforms;
use crate::pipeline::{ComputePipeline, DispatchDomain, PipelineManager};

/// What one `update` did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub particles: u32,
    pub constraints: u32,
    pub substeps: u32,
    /// Particles whose integration produced a non-finite position.
    pub discarded: usize,
    /// Constraint evaluations skipped for zero length, summed over substeps.
    pub skipped_constraints: usize,
    pub contacts: usize,
    pub degenerate_contacts: usize,
    pub integrate_ms: f32,
    pub solve_ms: f32,
    pub collide_ms: f32,
    pub total_ms: f32,
}

impl FrameUniforms {
    pub fn new(config: &SimulationConfig, dt: f32) -> Self {
        let mut uniforms = Self {
            gravity: config.gravity.to_array(),
            dt,
            global_damping: config.global_damping,
            ..Self::default()
        };
        if let Some(bounds) = &config.bounds {
            uniforms.bounds_min = bounds.min.to_array();
            uniforms.bounds_max = bounds.max.to_array();
            uniforms.restitution = bounds.restitution;
            uniforms.bounds_enabled = 1;
        }
        uniforms
    }
}

/// Occupied slot counts a frame runs over.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameExtent {
    pub particles: u32,
    pub constraints: u32,
}

fn check_dispatch(
    device: &Device,
    pipeline: &ComputePipeline,
    extent: FrameExtent,
) -> Result<u32, SimulationDeviceError> {
    let invocations = match pipeline.domain() {
        DispatchDomain::Particles => extent.particles,
        DispatchDomain::Constraints => extent.constraints,
    };
    device.workgroups_for(pipeline.label(), invocations as usize, pipeline.workgroup_size())
}

fn elapsed_ms(since: Instant) -> f32 {
    since.elapsed().as_secs_f32() * 1000.0
}

/// Runs one frame over the occupied slots.
///
/// Holds exclusive access to the particle buffer for the whole frame, so
/// readbacks observe either the previous or this frame, never a mix.
pub(crate) fn run_frame(
    device: &Device,
    pipelines: &PipelineManager,
    store: &mut BufferStore,
    extent: FrameExtent,
    config: &SimulationConfig,
    dt: f32,
    substeps: u32,
) -> Result<FrameReport, SimulationDeviceError> {
    device.ensure_alive()?;
    let mut report = FrameReport {
        particles: extent.particles,
        constraints: extent.constraints,
        ..FrameReport::default()
    };
    if !(dt.is_finite() && dt > 0.0) || extent.particles == 0 {
        return Ok(report);
    }

    let integrate_groups = check_dispatch(device, &pipelines.integrate, extent)?;
    let solve_groups = check_dispatch(device, &pipelines.solve_constraints, extent)?;
    let collide_groups = check_dispatch(device, &pipelines.detect_collisions, extent)?;

    let uniforms = FrameUniforms::new(config, dt);
    let n = extent.particles as usize;
    let m = extent.constraints as usize;

    let BufferStore {
        particles,
        constraints: constraint_buffer,
        spatial_hash,
        snapshot,
        corrections,
        incidence,
    } = store;
    let lost = |_| SimulationDeviceError::Lost;
    let mut particle_guard = particles.write().map_err(lost)?;
    let mut snapshot_guard = snapshot.write().map_err(lost)?;
    let mut correction_guard = corrections.write().map_err(lost)?;
    let constraint_guard = constraint_buffer.read().map_err(lost)?;

    let particles = &mut particle_guard[..n];
    let snapshot = &mut snapshot_guard[..n];
    let corrections = &mut correction_guard[..m];
    let records = &constraint_guard[..m];
    let incidence = &*incidence;

    let frame_start = Instant::now();

    let start = Instant::now();
    report.discarded = device.execute(pipelines.integrate.label(), || {
        integrate::integrate(particles, &uniforms)
    })?;
    report.integrate_ms = elapsed_ms(start);

    let start = Instant::now();
    if m > 0 {
        for _ in 0..substeps {
            report.skipped_constraints += device.execute(pipelines.solve_constraints.label(), || {
                constraints::solve_pass(particles, snapshot, records, corrections, incidence)
            })?;
        }
        report.substeps = substeps;
    }
    report.solve_ms = elapsed_ms(start);

    let start = Instant::now();
    if config.collisions_enabled && n > 1 {
        let stats = device.execute(pipelines.detect_collisions.label(), || {
            collide::collide(particles, snapshot, spatial_hash)
        })?;
        report.contacts = stats.contacts;
        report.degenerate_contacts = stats.degenerate;
    }
    report.collide_ms = elapsed_ms(start);
    report.total_ms = elapsed_ms(frame_start);

    if cfg!(debug_assertions) && (report.discarded > 0 || report.degenerate_contacts > 0) {
        tracing::trace!(
            discarded = report.discarded,
            degenerate_contacts = report.degenerate_contacts,
            skipped_constraints = report.skipped_constraints,
            "degenerate elements skipped"
        );
    }
    tracing::trace!(
        particles = n,
        constraints = m,
        substeps,
        integrate_groups,
        solve_groups,
        collide_groups,
        contacts = report.contacts,
        integrate_ms = report.integrate_ms,
        solve_ms = report.solve_ms,
        collide_ms = report.collide_ms,
        total_ms = report.total_ms,
        "frame complete"
    );
    Ok(report)
}
