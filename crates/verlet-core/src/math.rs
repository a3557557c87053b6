use glam::Vec3;

/// Hash float to [0,1] - port of GLSL hash11
pub fn hash11(p: f32) -> f32 {
    let mut p = (p * 0.1031).fract();
    p *= p + 33.33;
    p *= p + p;
    p.fract()
}

/// Deterministic per-slot offset in [-1, 1]^3, used to jitter spawn positions.
pub fn jitter3(slot: u32) -> Vec3 {
    // Slot indices reach 2^20, well past where f32 keeps integer precision
    // after the 0.1031 scaling, so fold the index first.
    let s = (slot % 65_521) as f32 + 1.0;
    Vec3::new(
        hash11(s * 1.37) * 2.0 - 1.0,
        hash11(s * 2.71 + 17.0) * 2.0 - 1.0,
        hash11(s * 3.93 + 41.0) * 2.0 - 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash11_in_unit_range() {
        for i in 0..1000 {
            let h = hash11(i as f32 * 0.731);
            assert!((0.0..1.0).contains(&h), "hash11 out of range: {h}");
        }
    }

    #[test]
    fn test_jitter3_bounded_and_deterministic() {
        for slot in [0u32, 1, 63, 64, 999_999] {
            let j = jitter3(slot);
            assert!(j.abs().max_element() <= 1.0);
            assert_eq!(j, jitter3(slot));
        }
        assert_ne!(jitter3(3), jitter3(4));
    }
}
