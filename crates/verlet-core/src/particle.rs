use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::math::jitter3;

/// Device-resident particle record: 48 bytes.
///
/// Velocity is implicit in `position - previous`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: [f32; 3], // 12 bytes
    pub mass: f32,          //  4 bytes
    pub previous: [f32; 3], // 12 bytes
    /// 0.0 for anchored particles, otherwise 1/mass.
    pub inv_mass: f32, //  4 bytes
    pub damping: f32,  //  4 bytes
    pub radius: f32,   //  4 bytes
    pub _pad: [f32; 2], //  8 bytes
}

impl Particle {
    #[inline]
    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn prev(&self) -> Vec3 {
        Vec3::from_array(self.previous)
    }

    /// Displacement over the last frame.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.pos() - self.prev()
    }

    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.inv_mass == 0.0
    }
}

/// Device-resident distance constraint record: 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ConstraintRecord {
    pub a: u32,
    pub b: u32,
    pub rest_length: f32,
    /// 1.0 = rigid, lower = springy.
    pub stiffness: f32,
}

/// Per-frame parameters uploaded for the integrate stage.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub gravity: [f32; 3],
    pub dt: f32,
    pub bounds_min: [f32; 3],
    pub global_damping: f32,
    pub bounds_max: [f32; 3],
    pub restitution: f32,
    /// 1 when `bounds_min`/`bounds_max` are active.
    pub bounds_enabled: u32,
    pub _pad: [u32; 3],
}

/// Describes how `add_particles` initializes each new slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleTemplate {
    pub position: Vec3,
    /// Half-extents of the deterministic per-slot position jitter.
    pub jitter: Vec3,
    /// Initial displacement per frame.
    pub velocity: Vec3,
    /// 0.0 spawns an anchored particle.
    pub mass: f32,
    /// Per-particle velocity loss per frame, in [0, 1].
    pub damping: f32,
    pub radius: f32,
    pub pinned: bool,
}

impl Default for ParticleTemplate {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            jitter: Vec3::ZERO,
            velocity: Vec3::ZERO,
            mass: 1.0,
            damping: 0.0,
            radius: 1.0,
            pinned: false,
        }
    }
}

impl ParticleTemplate {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_jitter(mut self, jitter: Vec3) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !(self.position.is_finite() && self.jitter.is_finite() && self.velocity.is_finite()) {
            return Err("position, jitter and velocity must be finite");
        }
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err("mass must be finite and non-negative");
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err("radius must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err("damping must be in [0, 1]");
        }
        Ok(())
    }

    /// Builds the record for `slot`. Inverse mass is fixed here for the particle's lifetime.
    pub(crate) fn instantiate(&self, slot: u32) -> Particle {
        let position = self.position + jitter3(slot) * self.jitter;
        let inv_mass = if self.pinned || self.mass == 0.0 {
            0.0
        } else {
            1.0 / self.mass
        };
        Particle {
            position: position.to_array(),
            mass: self.mass,
            previous: (position - self.velocity).to_array(),
            inv_mass,
            damping: self.damping,
            radius: self.radius,
            _pad: [0.0; 2],
        }
    }
}

/// A distance constraint to append with `add_constraints`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintSpec {
    pub a: u32,
    pub b: u32,
    /// `None` uses the endpoints' distance at the time the constraint is added.
    pub rest_length: Option<f32>,
    pub stiffness: f32,
}

impl ConstraintSpec {
    pub fn new(a: u32, b: u32, rest_length: f32, stiffness: f32) -> Self {
        Self {
            a,
            b,
            rest_length: Some(rest_length),
            stiffness,
        }
    }

    /// Constraint whose rest length is the current distance between `a` and `b`.
    pub fn between(a: u32, b: u32, stiffness: f32) -> Self {
        Self {
            a,
            b,
            rest_length: None,
            stiffness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layouts() {
        assert_eq!(std::mem::size_of::<Particle>(), 48);
        assert_eq!(std::mem::size_of::<ConstraintRecord>(), 16);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 64);
    }

    #[test]
    fn test_instantiate_inverse_mass() {
        let p = ParticleTemplate::default().with_mass(4.0).instantiate(0);
        assert_eq!(p.inv_mass, 0.25);
        let anchored = ParticleTemplate::default().with_mass(0.0).instantiate(0);
        assert!(anchored.is_anchored());
        let pinned = ParticleTemplate::default().with_mass(2.0).pinned().instantiate(0);
        assert!(pinned.is_anchored());
        assert_eq!(pinned.mass, 2.0);
    }

    #[test]
    fn test_instantiate_velocity_encoded_in_previous() {
        let p = ParticleTemplate::at(Vec3::new(1.0, 2.0, 3.0))
            .with_velocity(Vec3::new(0.5, 0.0, 0.0))
            .instantiate(7);
        assert_eq!(p.velocity(), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_template_validation() {
        assert!(ParticleTemplate::default().validate().is_ok());
        assert!(ParticleTemplate::default().with_mass(-1.0).validate().is_err());
        assert!(ParticleTemplate::default().with_radius(f32::NAN).validate().is_err());
        assert!(ParticleTemplate::default().with_damping(1.5).validate().is_err());
    }
}
