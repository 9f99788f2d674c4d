//! Gating: a companion volume whose positive voxels admit data voxels.

use crate::volume::VoxelVolume;

/// Gate seen by projections, statistics and localization.
///
/// `Open` behaves like a constant-1 volume of unbounded extent, so callers
/// never branch on whether gating is enabled.
#[derive(Debug, Clone, Copy)]
pub enum Gate<'a> {
    /// Every voxel is admitted.
    Open,
    /// Voxels are admitted where this volume's registered raw value is > 0.
    Volume(&'a VoxelVolume),
}

impl Gate<'_> {
    /// Whether the voxel at `(x, y, z)` of a volume registered with
    /// `reference_offset` is admitted.
    ///
    /// Registered positions outside the gate volume are rejected.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn admits(&self, x: i64, y: i64, z: i64, reference_offset: [i64; 3]) -> bool {
        match self {
            Gate::Open => true,
            Gate::Volume(gate) => {
                let [gx, gy, gz] = gate.registered(x, y, z, reference_offset);
                gate.within_bounds(gx, gy, gz)
                    && gate.get_raw(gx as usize, gy as usize, gz as usize) > 0.0
            }
        }
    }

    /// Value of the gate at a registered position: 1 for an open gate.
    #[must_use]
    pub fn value(&self, x: i64, y: i64, z: i64, reference_offset: [i64; 3]) -> f64 {
        match self {
            Gate::Open => 1.0,
            Gate::Volume(gate) => gate.value_at_offset(x, y, z, reference_offset),
        }
    }

    /// Whether this gate restricts anything.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Gate::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ValueKind;

    #[test]
    fn test_open_gate_admits_everything() {
        let gate = Gate::Open;
        assert!(gate.admits(-100, 5, 10_000, [0, 0, 0]));
        assert!((gate.value(0, 0, 0, [0, 0, 0]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_volume_gate_registration() {
        let mut g = VoxelVolume::new(ValueKind::U8, [4, 1, 1]).unwrap();
        g.set_raw(2, 0, 0, 1.0);
        let gate = Gate::Volume(&g);
        assert!(gate.admits(2, 0, 0, [0, 0, 0]));
        assert!(!gate.admits(1, 0, 0, [0, 0, 0]));
        // data volume shifted by +1: its voxel 1 lines up with gate voxel 2
        assert!(gate.admits(1, 0, 0, [1, 0, 0]));
        assert!(!gate.admits(10, 0, 0, [0, 0, 0]));
    }
}
