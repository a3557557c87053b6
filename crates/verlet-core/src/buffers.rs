//! Fixed-capacity device buffers and the store that owns them.
//!
//! Every buffer is allocated once when the engine is initialized and is
//! never resized: in-flight work holds references into these arrays, so a
//! reallocation would invalidate them. Callers address buffers by slot index
//! through [`DeviceBuffer::write_range`] and [`DeviceBuffer::read_range`].

use std::ops::BitOr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::config::EngineConfig;
use crate::device::Device;
use crate::error::{BufferError, InitError};
use crate::grid::SpatialHashGrid;
use crate::particle::{ConstraintRecord, Particle};

/// How a buffer may be used by pipelines and transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferUsages(u32);

impl BufferUsages {
    pub const STORAGE: Self = Self(1);
    /// Kernels may write the buffer.
    pub const STORAGE_WRITE: Self = Self(1 << 1);
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BufferUsages {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Identifies a buffer in the [`BufferStore`] for pipeline bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Particles,
    Constraints,
    SpatialHash,
    BodySnapshot,
    ConstraintCorrections,
    Incidence,
}

impl BufferSlot {
    pub fn label(self) -> &'static str {
        match self {
            BufferSlot::Particles => "particles",
            BufferSlot::Constraints => "constraints",
            BufferSlot::SpatialHash => "spatial_hash",
            BufferSlot::BodySnapshot => "body_snapshot",
            BufferSlot::ConstraintCorrections => "constraint_corrections",
            BufferSlot::Incidence => "incidence",
        }
    }
}

/// Fixed-capacity array of Pod records shared with the device.
pub struct DeviceBuffer<T> {
    label: &'static str,
    usage: BufferUsages,
    capacity: usize,
    data: Arc<RwLock<Vec<T>>>,
}

impl<T: Pod + Send + Sync> DeviceBuffer<T> {
    pub fn new(
        device: &Device,
        label: &'static str,
        capacity: usize,
        usage: BufferUsages,
    ) -> Result<Self, InitError> {
        let bytes = (capacity as u64).checked_mul(std::mem::size_of::<T>() as u64);
        let bytes = match bytes {
            Some(b) if b <= device.limits().max_buffer_size => b,
            _ => {
                return Err(InitError::BufferAllocation {
                    label,
                    bytes: bytes.unwrap_or(u64::MAX),
                })
            }
        };

        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| InitError::BufferAllocation { label, bytes })?;
        data.resize(capacity, T::zeroed());

        Ok(Self {
            label,
            usage,
            capacity,
            data: Arc::new(RwLock::new(data)),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn byte_size(&self) -> u64 {
        (self.capacity * std::mem::size_of::<T>()) as u64
    }

    /// Copies `data` into slots `[offset, offset + data.len())`.
    pub fn write_range(&self, offset: usize, data: &[T]) -> Result<(), BufferError> {
        let end = self.checked_end(offset, data.len()).ok_or(BufferError::CapacityExceeded {
            label: self.label,
            offset,
            len: data.len(),
            capacity: self.capacity,
        })?;
        let mut guard = self.write()?;
        guard[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Copies slots `[offset, offset + len)` out of the buffer.
    pub fn read_range(&self, offset: usize, len: usize) -> Result<Vec<T>, BufferError> {
        let end = self.checked_end(offset, len).ok_or(BufferError::OutOfRange {
            label: self.label,
            offset,
            len,
            capacity: self.capacity,
        })?;
        let guard = self.read()?;
        Ok(guard[offset..end].to_vec())
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>, BufferError> {
        self.data.read().map_err(|_| BufferError::Poisoned(self.label))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>, BufferError> {
        self.data.write().map_err(|_| BufferError::Poisoned(self.label))
    }

    /// Handle to the backing storage for asynchronous copies.
    pub(crate) fn share(&self) -> Arc<RwLock<Vec<T>>> {
        Arc::clone(&self.data)
    }

    fn checked_end(&self, offset: usize, len: usize) -> Option<usize> {
        offset.checked_add(len).filter(|&end| end <= self.capacity)
    }
}

/// Per-constraint endpoint corrections produced by one solver pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ConstraintCorrection {
    pub delta_a: [f32; 3],
    /// 1 if the constraint produced a correction this pass, 0 if it was skipped.
    pub active: u32,
    pub delta_b: [f32; 3],
    pub _pad: u32,
}

/// Read-only copy of the per-particle state a stage needs from other particles.
///
/// Stages read neighbours from the snapshot and write only their own slot in
/// the particle buffer, so no two invocations write the same element.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BodySnapshot {
    pub position: [f32; 3],
    pub inv_mass: f32,
    pub radius: f32,
    pub _pad: [f32; 3],
}

impl BodySnapshot {
    #[inline]
    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Particle → incident constraint endpoints, in CSR form.
///
/// `entries[offsets[p]..offsets[p + 1]]` lists `constraint * 2 + side`
/// (side 0 = endpoint `a`, 1 = endpoint `b`) for every constraint touching `p`.
/// `max_degree` is the largest number of constraints on any one particle.
pub struct IncidenceTable {
    offsets: Vec<u32>,
    entries: Vec<u32>,
    cursor: Vec<u32>,
    max_degree: u32,
}

impl IncidenceTable {
    fn new(max_particles: usize, max_constraints: usize) -> Result<Self, InitError> {
        let bytes = ((max_particles * 2 + 1 + max_constraints * 2) * 4) as u64;
        let alloc = |len: usize| -> Result<Vec<u32>, InitError> {
            let mut v = Vec::new();
            v.try_reserve_exact(len).map_err(|_| InitError::BufferAllocation {
                label: BufferSlot::Incidence.label(),
                bytes,
            })?;
            v.resize(len, 0);
            Ok(v)
        };
        Ok(Self {
            offsets: alloc(max_particles + 1)?,
            entries: alloc(max_constraints * 2)?,
            cursor: alloc(max_particles)?,
            max_degree: 0,
        })
    }

    pub fn byte_size(&self) -> u64 {
        ((self.offsets.len() + self.entries.len() + self.cursor.len()) * 4) as u64
    }

    /// Rebuilds the table for the first `particle_count` particles and the given constraints.
    pub fn rebuild(&mut self, constraints: &[ConstraintRecord], particle_count: usize) {
        let counts = &mut self.cursor[..particle_count];
        counts.fill(0);
        for c in constraints {
            counts[c.a as usize] += 1;
            counts[c.b as usize] += 1;
        }
        self.max_degree = counts.iter().copied().max().unwrap_or(0);

        self.offsets[0] = 0;
        for p in 0..particle_count {
            self.offsets[p + 1] = self.offsets[p] + self.cursor[p];
        }

        self.cursor[..particle_count].copy_from_slice(&self.offsets[..particle_count]);
        for (k, c) in constraints.iter().enumerate() {
            let k = k as u32;
            for (side, p) in [(0, c.a), (1, c.b)] {
                let slot = &mut self.cursor[p as usize];
                self.entries[*slot as usize] = k * 2 + side;
                *slot += 1;
            }
        }
    }

    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    /// Uniform scale applied to every particle's summed corrections.
    ///
    /// Sharing one factor keeps each constraint's inverse-mass split intact,
    /// and `1 / max_degree` keeps the simultaneous update from overshooting.
    #[inline]
    pub fn relaxation(&self) -> f32 {
        1.0 / self.max_degree.max(1) as f32
    }

    /// Incident `constraint * 2 + side` entries of particle `p`.
    #[inline]
    pub fn incident(&self, p: usize) -> &[u32] {
        let start = self.offsets[p] as usize;
        let end = self.offsets[p + 1] as usize;
        &self.entries[start..end]
    }
}

/// Owns every device-resident array of one engine instance.
pub struct BufferStore {
    pub particles: DeviceBuffer<Particle>,
    pub constraints: DeviceBuffer<ConstraintRecord>,
    pub spatial_hash: SpatialHashGrid,
    pub snapshot: DeviceBuffer<BodySnapshot>,
    pub corrections: DeviceBuffer<ConstraintCorrection>,
    pub incidence: IncidenceTable,
}

impl BufferStore {
    pub fn new(device: &Device, config: &EngineConfig) -> Result<Self, InitError> {
        let max_particles = config.max_particles as usize;
        let max_constraints = config.max_constraints as usize;
        let storage_rw = BufferUsages::STORAGE | BufferUsages::STORAGE_WRITE;

        let store = Self {
            particles: DeviceBuffer::new(
                device,
                BufferSlot::Particles.label(),
                max_particles,
                storage_rw | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            )?,
            constraints: DeviceBuffer::new(
                device,
                BufferSlot::Constraints.label(),
                max_constraints,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            )?,
            spatial_hash: SpatialHashGrid::new(
                config.spatial_hash_cell_size,
                config.spatial_hash_table_size as usize,
                max_particles,
            )
            .ok_or(InitError::BufferAllocation {
                label: BufferSlot::SpatialHash.label(),
                bytes: SpatialHashGrid::byte_size_for(
                    config.spatial_hash_table_size as usize,
                    max_particles,
                ),
            })?,
            snapshot: DeviceBuffer::new(
                device,
                BufferSlot::BodySnapshot.label(),
                max_particles,
                storage_rw,
            )?,
            corrections: DeviceBuffer::new(
                device,
                BufferSlot::ConstraintCorrections.label(),
                max_constraints,
                storage_rw,
            )?,
            incidence: IncidenceTable::new(max_particles, max_constraints)?,
        };

        tracing::info!(
            max_particles,
            max_constraints,
            allocated_mb = store.allocated_bytes() as f64 / (1024.0 * 1024.0),
            "device buffers allocated"
        );
        Ok(store)
    }

    /// Usage flags of the buffer bound at `slot`.
    pub fn usage(&self, slot: BufferSlot) -> BufferUsages {
        let storage_rw = BufferUsages::STORAGE | BufferUsages::STORAGE_WRITE;
        match slot {
            BufferSlot::Particles => self.particles.usage(),
            BufferSlot::Constraints => self.constraints.usage(),
            BufferSlot::BodySnapshot => self.snapshot.usage(),
            BufferSlot::ConstraintCorrections => self.corrections.usage(),
            BufferSlot::SpatialHash | BufferSlot::Incidence => storage_rw,
        }
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.particles.byte_size()
            + self.constraints.byte_size()
            + self.spatial_hash.byte_size()
            + self.snapshot.byte_size()
            + self.corrections.byte_size()
            + self.incidence.byte_size()
    }
}
