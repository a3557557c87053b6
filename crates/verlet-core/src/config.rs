use glam::Vec3;

use crate::error::InitError;

/// Invocations per workgroup for every compute program.
pub const WORKGROUP_SIZE: usize = 64;

/// Upper bound on candidates tested per spatial hash cell in one collision pass.
pub const MAX_CELL_CANDIDATES: usize = 64;

/// Axis-aligned world box that particles are kept inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
    /// Fraction of the normal velocity kept after hitting a wall, in [0, 1].
    pub restitution: f32,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3, restitution: f32) -> Self {
        Self {
            min,
            max,
            restitution,
        }
    }
}

/// Per-frame simulation parameters. May be changed between `update` calls.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Constraint relaxation passes per frame.
    pub substeps: u32,
    pub gravity: Vec3,
    /// Fraction of velocity removed every frame, in [0, 1].
    pub global_damping: f32,
    pub collisions_enabled: bool,
    pub bounds: Option<Bounds>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            substeps: 4,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            global_damping: 0.01,
            collisions_enabled: true,
            bounds: None,
        }
    }
}

/// Construction-time engine configuration. Immutable once the engine exists.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub max_particles: u32,
    pub max_constraints: u32,
    /// Edge length of one spatial hash cell. Should be at least twice the largest radius.
    pub spatial_hash_cell_size: f32,
    /// Number of hash buckets in the spatial hash table.
    pub spatial_hash_table_size: u32,
    /// Worker threads for the compute device; 0 picks the rayon default.
    pub worker_threads: usize,
    pub simulation: SimulationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_particles: 1_000_000,
            max_constraints: 100_000,
            spatial_hash_cell_size: 10.0,
            spatial_hash_table_size: 131_072,
            worker_threads: 0,
            simulation: SimulationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Small-capacity configuration, convenient for tests and tools.
    pub fn with_capacity(max_particles: u32, max_constraints: u32) -> Self {
        Self {
            max_particles,
            max_constraints,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), InitError> {
        if self.max_particles == 0 {
            return Err(InitError::InvalidConfig("max_particles must be > 0".into()));
        }
        if !(self.spatial_hash_cell_size.is_finite() && self.spatial_hash_cell_size > 0.0) {
            return Err(InitError::InvalidConfig(format!(
                "spatial_hash_cell_size must be positive, got {}",
                self.spatial_hash_cell_size
            )));
        }
        if self.spatial_hash_table_size == 0 {
            return Err(InitError::InvalidConfig(
                "spatial_hash_table_size must be > 0".into(),
            ));
        }
        self.simulation
            .validate()
            .map_err(|reason| InitError::InvalidConfig(reason.into()))
    }
}

impl SimulationConfig {
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !self.gravity.is_finite() {
            return Err("gravity must be finite");
        }
        if !(0.0..=1.0).contains(&self.global_damping) {
            return Err("global_damping must be in [0, 1]");
        }
        if let Some(b) = &self.bounds {
            if !(b.min.is_finite() && b.max.is_finite()) || b.min.cmpgt(b.max).any() {
                return Err("bounds must be finite with min <= max");
            }
            if !(0.0..=1.0).contains(&b.restitution) {
                return Err("bounds restitution must be in [0, 1]");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_cell_size() {
        let config = EngineConfig {
            spatial_hash_cell_size: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(InitError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut config = EngineConfig::with_capacity(16, 16);
        config.simulation.bounds = Some(Bounds::new(Vec3::ONE, Vec3::ZERO, 0.5));
        assert!(config.validate().is_err());
    }
}
