//! Data-parallel compute device.
//!
//! The device is a dedicated rayon thread pool plus the limits a dispatch has
//! to respect. Every compute stage runs inside [`Device::execute`], so a
//! kernel fault is caught at the device boundary and turns the device into
//! the lost state instead of unwinding through the caller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{InitError, SimulationDeviceError};

/// Hard limits of the compute device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_compute_workgroups_per_dimension: u32,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_buffer_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_compute_workgroups_per_dimension: 65_535,
            max_compute_invocations_per_workgroup: 256,
            max_buffer_size: 1 << 30,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeviceDescriptor {
    pub label: &'static str,
    /// 0 lets rayon pick the thread count.
    pub worker_threads: usize,
    pub limits: Limits,
}

pub struct Device {
    label: &'static str,
    pool: ThreadPool,
    limits: Limits,
    lost: AtomicBool,
}

impl Device {
    pub fn new(desc: &DeviceDescriptor) -> Result<Self, InitError> {
        let label = desc.label;
        let pool = ThreadPoolBuilder::new()
            .num_threads(desc.worker_threads)
            .thread_name(move |i| format!("{label}-worker-{i}"))
            .build()
            .map_err(|e| InitError::DeviceCreation(e.to_string()))?;

        tracing::info!(
            device = label,
            threads = pool.current_num_threads(),
            "compute device created"
        );

        Ok(Self {
            label,
            pool,
            limits: desc.limits,
            lost: AtomicBool::new(false),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Destroys the device. All later work fails with [`SimulationDeviceError::Lost`].
    pub fn destroy(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            tracing::warn!(device = self.label, "compute device destroyed");
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), SimulationDeviceError> {
        if self.is_lost() {
            Err(SimulationDeviceError::Lost)
        } else {
            Ok(())
        }
    }

    /// Number of workgroups needed for `invocations`, checked against device limits.
    pub(crate) fn workgroups_for(
        &self,
        pipeline: &'static str,
        invocations: usize,
        workgroup_size: u32,
    ) -> Result<u32, SimulationDeviceError> {
        let groups = invocations.div_ceil(workgroup_size as usize);
        let limit = self.limits.max_compute_workgroups_per_dimension;
        if groups > limit as usize {
            return Err(SimulationDeviceError::DispatchLimit {
                pipeline,
                workgroups: u32::try_from(groups).unwrap_or(u32::MAX),
                limit,
            });
        }
        Ok(groups as u32)
    }

    /// Runs `work` on the device's pool, blocking until it completes.
    ///
    /// A panic inside `work` marks the device lost and is reported as a
    /// kernel fault for `pipeline`.
    pub(crate) fn execute<R, F>(&self, pipeline: &'static str, work: F) -> Result<R, SimulationDeviceError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.ensure_alive()?;
        match panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(work))) {
            Ok(out) => Ok(out),
            Err(_) => {
                self.lost.store(true, Ordering::Release);
                tracing::error!(device = self.label, pipeline, "kernel fault, device lost");
                Err(SimulationDeviceError::KernelFault { pipeline })
            }
        }
    }

    /// Queues `work` on the pool without waiting for it.
    pub(crate) fn spawn<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(work);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("label", &self.label)
            .field("threads", &self.pool.current_num_threads())
            .field("limits", &self.limits)
            .field("lost", &self.is_lost())
            .finish()
    }
}
