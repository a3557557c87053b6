use glam::{IVec3, Vec3};
use rayon::prelude::*;

use crate::config::WORKGROUP_SIZE;

/// Uniform spatial hash grid, rebuilt before every collision pass.
///
/// Uses counting sort for O(N) construction: count particles per cell -> prefix sum -> scatter.
/// Cell coordinates are hashed into a fixed number of buckets; distinct cells can share a
/// bucket, so each particle's exact cell is kept to filter bucket members.
pub struct SpatialHashGrid {
    cell_size: f32,
    inv_cell_size: f32,
    table_size: usize,
    /// cell_count[hash] = number of particles in the bucket
    cell_count: Vec<u32>,
    /// cell_start[hash] = index where the bucket's particles begin in sorted_indices
    cell_start: Vec<u32>,
    /// Particle indices sorted by bucket
    sorted_indices: Vec<u32>,
    /// Bucket per particle (used during build)
    particle_hashes: Vec<u32>,
    /// Exact cell per particle
    particle_cells: Vec<IVec3>,
    count: usize,
}

impl SpatialHashGrid {
    /// Allocates a grid for up to `max_particles`. Returns `None` if allocation fails.
    pub fn new(cell_size: f32, table_size: usize, max_particles: usize) -> Option<Self> {
        Some(Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            table_size,
            cell_count: try_zeroed(table_size)?,
            cell_start: try_zeroed(table_size)?,
            sorted_indices: try_zeroed(max_particles)?,
            particle_hashes: try_zeroed(max_particles)?,
            particle_cells: try_zeroed(max_particles)?,
            count: 0,
        })
    }

    pub fn byte_size_for(table_size: usize, max_particles: usize) -> u64 {
        (table_size * 2 * 4 + max_particles * (4 + 4 + 12)) as u64
    }

    pub fn byte_size(&self) -> u64 {
        Self::byte_size_for(self.table_size, self.sorted_indices.len())
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn capacity(&self) -> usize {
        self.sorted_indices.len()
    }

    /// Build the grid from the first `count` positions.
    ///
    /// Cell assignment runs in parallel workgroups; the prefix sum and scatter are sequential.
    /// Panics if `count` exceeds the grid's capacity.
    pub fn build(&mut self, positions: &[Vec3], count: usize) {
        self.build_with(positions, count, |p| *p);
    }

    /// Build the grid from the first `count` items, reading each position with `position_of`.
    pub fn build_with<T, F>(&mut self, items: &[T], count: usize, position_of: F)
    where
        T: Sync,
        F: Fn(&T) -> Vec3 + Sync,
    {
        self.count = count;
        let inv = self.inv_cell_size;
        let table_size = self.table_size;

        // 1. Cell + bucket per particle
        self.particle_cells[..count]
            .par_chunks_mut(WORKGROUP_SIZE)
            .zip(self.particle_hashes[..count].par_chunks_mut(WORKGROUP_SIZE))
            .zip(items[..count].par_chunks(WORKGROUP_SIZE))
            .for_each(|((cells, hashes), group)| {
                for ((cell, hash), item) in cells.iter_mut().zip(hashes.iter_mut()).zip(group) {
                    *cell = cell_coords(position_of(item), inv);
                    *hash = hash_cell(*cell, table_size) as u32;
                }
            });

        // 2. Count per bucket
        self.cell_count.fill(0);
        for &h in &self.particle_hashes[..count] {
            self.cell_count[h as usize] += 1;
        }

        // 3. Prefix sum on cell_count -> cell_start
        self.cell_start[0] = 0;
        for k in 1..self.table_size {
            self.cell_start[k] = self.cell_start[k - 1] + self.cell_count[k - 1];
        }

        // 4. Scatter particles into sorted_indices, reusing cell_count as offsets
        self.cell_count.fill(0);
        for i in 0..count {
            let h = self.particle_hashes[i] as usize;
            let idx = self.cell_start[h] + self.cell_count[h];
            self.sorted_indices[idx as usize] = i as u32;
            self.cell_count[h] += 1;
        }
    }

    /// Cell of particle `i` as of the last build.
    #[inline]
    pub fn cell_of(&self, i: usize) -> IVec3 {
        self.particle_cells[i]
    }

    /// Cell containing `pos`.
    #[inline]
    pub fn cell_at(&self, pos: Vec3) -> IVec3 {
        cell_coords(pos, self.inv_cell_size)
    }

    /// Particles in the bucket `cell` hashes to. May include particles of other
    /// cells that share the bucket; compare against [`Self::cell_of`].
    #[inline]
    pub fn bucket(&self, cell: IVec3) -> &[u32] {
        let h = hash_cell(cell, self.table_size);
        let start = self.cell_start[h] as usize;
        let end = start + self.cell_count[h] as usize;
        &self.sorted_indices[start..end]
    }

    /// Calls `callback(particle_index)` for every particle in exactly `cell`.
    pub fn query_cell<F: FnMut(u32)>(&self, cell: IVec3, mut callback: F) {
        for &j in self.bucket(cell) {
            if self.particle_cells[j as usize] == cell {
                callback(j);
            }
        }
    }

    /// Number of particles indexed by the last build.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Hash function: cell coords -> table index
#[inline]
fn hash_cell(cell: IVec3, table_size: usize) -> usize {
    let h = (cell.x as u32).wrapping_mul(73856093)
        ^ (cell.y as u32).wrapping_mul(19349663)
        ^ (cell.z as u32).wrapping_mul(83492791);
    (h as usize) % table_size
}

/// Convert world position to cell coordinates
#[inline]
fn cell_coords(pos: Vec3, inv_cell_size: f32) -> IVec3 {
    (pos * inv_cell_size).floor().as_ivec3()
}

fn try_zeroed<T: Clone + Default>(len: usize) -> Option<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, T::default());
    Some(v)
}
