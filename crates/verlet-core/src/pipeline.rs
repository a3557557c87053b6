//! Compute program compilation.
//!
//! A pipeline pairs an entry point in the kernel module with the binding
//! layout it runs against. Compiling checks the layout against the buffer
//! store and the device limits, so a pipeline that exists can always be
//! dispatched over the store's full capacity. The layout is only needed for
//! that check and is not kept.

use std::collections::HashSet;

use crate::buffers::{BufferSlot, BufferStore, BufferUsages};
use crate::config::WORKGROUP_SIZE;
use crate::device::Device;
use crate::error::InitError;
use crate::kernels;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingType {
    Uniform,
    Storage { read_only: bool },
}

/// What a binding is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingResource {
    /// The per-frame uniform block.
    Uniforms,
    Buffer(BufferSlot),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub ty: BindingType,
    pub resource: BindingResource,
}

impl BindGroupLayoutEntry {
    pub const fn uniform(binding: u32) -> Self {
        Self {
            binding,
            ty: BindingType::Uniform,
            resource: BindingResource::Uniforms,
        }
    }

    pub const fn storage(binding: u32, slot: BufferSlot, read_only: bool) -> Self {
        Self {
            binding,
            ty: BindingType::Storage { read_only },
            resource: BindingResource::Buffer(slot),
        }
    }
}

/// Which buffer decides how many invocations a dispatch launches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchDomain {
    Particles,
    Constraints,
}

pub struct ComputePipelineDescriptor<'a> {
    pub label: &'static str,
    pub entry_point: &'static str,
    pub workgroup_size: u32,
    pub domain: DispatchDomain,
    pub entries: &'a [BindGroupLayoutEntry],
}

#[derive(Debug)]
pub struct ComputePipeline {
    label: &'static str,
    entry_point: &'static str,
    workgroup_size: u32,
    domain: DispatchDomain,
}

impl ComputePipeline {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn entry_point(&self) -> &'static str {
        self.entry_point
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub fn domain(&self) -> DispatchDomain {
        self.domain
    }

    /// Validates `desc` against the device and the buffer store.
    pub fn compile(
        device: &Device,
        store: &BufferStore,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> Result<Self, InitError> {
        let fail = |reason: String| InitError::PipelineCompilation {
            pipeline: desc.label,
            reason,
        };

        if !kernels::ENTRY_POINTS.contains(&desc.entry_point) {
            return Err(fail(format!("unknown entry point '{}'", desc.entry_point)));
        }

        let limits = device.limits();
        if desc.workgroup_size == 0
            || desc.workgroup_size > limits.max_compute_invocations_per_workgroup
        {
            return Err(fail(format!(
                "workgroup size {} outside 1..={}",
                desc.workgroup_size, limits.max_compute_invocations_per_workgroup
            )));
        }

        let mut seen = HashSet::new();
        for entry in desc.entries {
            if !seen.insert(entry.binding) {
                return Err(fail(format!("binding {} declared twice", entry.binding)));
            }
            match (entry.ty, entry.resource) {
                (BindingType::Uniform, BindingResource::Uniforms) => {}
                (BindingType::Storage { read_only }, BindingResource::Buffer(slot)) => {
                    let usage = store.usage(slot);
                    if !usage.contains(BufferUsages::STORAGE) {
                        return Err(fail(format!(
                            "buffer '{}' at binding {} is not a storage buffer",
                            slot.label(),
                            entry.binding
                        )));
                    }
                    if !read_only && !usage.contains(BufferUsages::STORAGE_WRITE) {
                        return Err(fail(format!(
                            "buffer '{}' at binding {} is bound read-write but is read-only",
                            slot.label(),
                            entry.binding
                        )));
                    }
                }
                (ty, resource) => {
                    return Err(fail(format!(
                        "binding {} type {ty:?} does not match resource {resource:?}",
                        entry.binding
                    )));
                }
            }
        }

        let capacity = match desc.domain {
            DispatchDomain::Particles => store.particles.capacity(),
            DispatchDomain::Constraints => store.constraints.capacity(),
        };
        device
            .workgroups_for(desc.label, capacity, desc.workgroup_size)
            .map_err(|e| fail(e.to_string()))?;

        Ok(Self {
            label: desc.label,
            entry_point: desc.entry_point,
            workgroup_size: desc.workgroup_size,
            domain: desc.domain,
        })
    }
}

const INTEGRATE_LAYOUT: &[BindGroupLayoutEntry] = &[
    BindGroupLayoutEntry::uniform(0),
    BindGroupLayoutEntry::storage(1, BufferSlot::Particles, false),
];

const SOLVE_CONSTRAINTS_LAYOUT: &[BindGroupLayoutEntry] = &[
    BindGroupLayoutEntry::storage(0, BufferSlot::Constraints, true),
    BindGroupLayoutEntry::storage(1, BufferSlot::Particles, false),
    BindGroupLayoutEntry::storage(2, BufferSlot::BodySnapshot, false),
    BindGroupLayoutEntry::storage(3, BufferSlot::ConstraintCorrections, false),
    BindGroupLayoutEntry::storage(4, BufferSlot::Incidence, true),
];

const DETECT_COLLISIONS_LAYOUT: &[BindGroupLayoutEntry] = &[
    BindGroupLayoutEntry::uniform(0),
    BindGroupLayoutEntry::storage(1, BufferSlot::Particles, false),
    BindGroupLayoutEntry::storage(2, BufferSlot::BodySnapshot, false),
    BindGroupLayoutEntry::storage(3, BufferSlot::SpatialHash, false),
];

/// The three compiled programs. Immutable after initialization.
#[derive(Debug)]
pub struct PipelineManager {
    pub integrate: ComputePipeline,
    pub solve_constraints: ComputePipeline,
    pub detect_collisions: ComputePipeline,
}

impl PipelineManager {
    pub fn compile(device: &Device, store: &BufferStore) -> Result<Self, InitError> {
        let integrate = ComputePipeline::compile(
            device,
            store,
            &ComputePipelineDescriptor {
                label: "integrate",
                entry_point: kernels::integrate::ENTRY_POINT,
                workgroup_size: WORKGROUP_SIZE as u32,
                domain: DispatchDomain::Particles,
                entries: INTEGRATE_LAYOUT,
            },
        )?;
        let solve_constraints = ComputePipeline::compile(
            device,
            store,
            &ComputePipelineDescriptor {
                label: "solve_constraints",
                entry_point: kernels::constraints::ENTRY_POINT,
                workgroup_size: WORKGROUP_SIZE as u32,
                domain: DispatchDomain::Constraints,
                entries: SOLVE_CONSTRAINTS_LAYOUT,
            },
        )?;
        let detect_collisions = ComputePipeline::compile(
            device,
            store,
            &ComputePipelineDescriptor {
                label: "detect_collisions",
                entry_point: kernels::collide::ENTRY_POINT,
                workgroup_size: WORKGROUP_SIZE as u32,
                domain: DispatchDomain::Particles,
                entries: DETECT_COLLISIONS_LAYOUT,
            },
        )?;

        tracing::debug!("compute pipelines compiled");
        Ok(Self {
            integrate,
            solve_constraints,
            detect_collisions,
        })
    }
}
