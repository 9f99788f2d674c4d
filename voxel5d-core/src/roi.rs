//! Regions of interest over integer voxel coordinates.
//!
//! A [`Roi`] is a membership predicate. Four variants exist:
//! - **Unconstrained** - every voxel is inside (the default)
//! - **Box** - inclusive min/max corners
//! - **OrthogonalSlabs** - one 2D polygon per viewing axis, membership is the intersection
//! - **HalfspacePlanes** - 5D origin/direction pairs, membership needs every dot product >= 0

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::util::{i64_to_f64, usize_to_i64};

/// Pixel axes `(horizontal, vertical)` of a slice viewed along `axis`.
///
/// Viewing along X shows `(z, y)`, along Y shows `(x, z)` and along Z shows `(x, y)`.
#[must_use]
#[inline]
pub fn plane_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (2, 1),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// Inclusive rectangle in slice pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect2D {
    pub u_min: i64,
    pub u_max: i64,
    pub v_min: i64,
    pub v_max: i64,
}

impl Rect2D {
    /// Whether the pixel `(u, v)` lies in the rectangle.
    #[must_use]
    #[inline]
    pub fn contains(&self, u: i64, v: i64) -> bool {
        u >= self.u_min && u <= self.u_max && v >= self.v_min && v <= self.v_max
    }
}

/// A half-space `dot(p - origin, direction) >= 0` in (x, y, z, channel, time).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Halfspace {
    pub origin: [f64; 5],
    pub direction: [f64; 5],
}

impl Halfspace {
    /// Create a half-space from an origin and an (unnormalised) inward direction.
    #[must_use]
    pub fn new(origin: [f64; 5], direction: [f64; 5]) -> Self {
        Self { origin, direction }
    }

    #[inline]
    fn admits(&self, point: &[f64; 5]) -> bool {
        let dot: f64 = (0..5)
            .map(|d| (point[d] - self.origin[d]) * self.direction[d])
            .sum();
        dot >= 0.0
    }
}

/// Region of interest variants.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Roi {
    /// No constraint.
    #[default]
    Unconstrained,
    /// Inclusive box.
    Box { min: [i64; 3], max: [i64; 3] },
    /// One optional polygon per viewing axis, in that axis' slice coordinates.
    OrthogonalSlabs { polygons: [Option<Vec<(f64, f64)>>; 3] },
    /// Intersection of 5D half-spaces.
    HalfspacePlanes { planes: Vec<Halfspace> },
}

impl Roi {
    /// Box covering the whole of a volume with the given shape.
    #[must_use]
    pub fn full(shape: [usize; 3]) -> Self {
        Roi::Box {
            min: [0; 3],
            max: [
                usize_to_i64(shape[0]) - 1,
                usize_to_i64(shape[1]) - 1,
                usize_to_i64(shape[2]) - 1,
            ],
        }
    }

    /// Box from two corners given in any order.
    #[must_use]
    pub fn from_corners(a: [i64; 3], b: [i64; 3]) -> Self {
        Roi::Box {
            min: [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])],
            max: [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])],
        }
    }

    /// Whether the voxel `(x, y, z)` belongs to the region.
    ///
    /// Half-space planes are evaluated with zero channel and time deltas.
    #[must_use]
    #[inline]
    pub fn in_range(&self, x: i64, y: i64, z: i64) -> bool {
        match self {
            Roi::Unconstrained => true,
            Roi::Box { min, max } => {
                x >= min[0] && x <= max[0] && y >= min[1] && y <= max[1] && z >= min[2] && z <= max[2]
            }
            Roi::OrthogonalSlabs { polygons } => {
                let p = [i64_to_f64(x), i64_to_f64(y), i64_to_f64(z)];
                polygons.iter().enumerate().all(|(axis, poly)| match poly {
                    None => true,
                    Some(vertices) => {
                        let (u, v) = plane_axes(axis);
                        point_in_polygon((p[u], p[v]), vertices)
                    }
                })
            }
            Roi::HalfspacePlanes { planes } => {
                let (x, y, z) = (i64_to_f64(x), i64_to_f64(y), i64_to_f64(z));
                planes.iter().all(|plane| {
                    let p = [x, y, z, plane.origin[3], plane.origin[4]];
                    plane.admits(&p)
                })
            }
        }
    }

    /// Membership in full 5D. Only half-space planes look at channel and time.
    #[must_use]
    pub fn in_range_5d(&self, point: &[f64; 5]) -> bool {
        match self {
            Roi::HalfspacePlanes { planes } => planes.iter().all(|plane| plane.admits(point)),
            _ => self.in_range(
                crate::util::round_to_i64(point[0]),
                crate::util::round_to_i64(point[1]),
                crate::util::round_to_i64(point[2]),
            ),
        }
    }

    /// Extent of a box along `axis` (`max - min + 1`); 0 for every other variant.
    #[must_use]
    pub fn get_size(&self, axis: usize) -> i64 {
        match self {
            Roi::Box { min, max } if axis < 3 => max[axis] - min[axis] + 1,
            _ => 0,
        }
    }

    /// Rectangle of the two axes shown when viewing along `axis` (box only).
    #[must_use]
    pub fn rect_2d(&self, axis: usize) -> Option<Rect2D> {
        match self {
            Roi::Box { min, max } => {
                let (u, v) = plane_axes(axis);
                Some(Rect2D {
                    u_min: min[u],
                    u_max: max[u],
                    v_min: min[v],
                    v_max: max[v],
                })
            }
            _ => None,
        }
    }

    /// Inclusive voxel range worth scanning in a volume of `shape`.
    ///
    /// Returns `None` when a box does not intersect the volume.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn bounding_box(&self, shape: [usize; 3]) -> Option<([usize; 3], [usize; 3])> {
        if shape.contains(&0) {
            return None;
        }
        let top = [
            usize_to_i64(shape[0]) - 1,
            usize_to_i64(shape[1]) - 1,
            usize_to_i64(shape[2]) - 1,
        ];
        match self {
            Roi::Box { min, max } => {
                let mut lo = [0usize; 3];
                let mut hi = [0usize; 3];
                for d in 0..3 {
                    let a = min[d].max(0);
                    let b = max[d].min(top[d]);
                    if a > b {
                        return None;
                    }
                    lo[d] = a as usize;
                    hi[d] = b as usize;
                }
                Some((lo, hi))
            }
            _ => Some(([0; 3], [shape[0] - 1, shape[1] - 1, shape[2] - 1])),
        }
    }
}

/// Even-odd ray casting test.
fn point_in_polygon(point: (f64, f64), vertices: &[(f64, f64)]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        let intersects = ((yi > point.1) != (yj > point.1))
            && (point.0 < (xj - xi) * (point.1 - yi) / (yj - yi + f64::EPSILON) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_boundaries_exact() {
        let roi = Roi::Box {
            min: [2, 3, 4],
            max: [5, 6, 7],
        };
        for (lo, hi, axis) in [(2, 5, 0), (3, 6, 1), (4, 7, 2)] {
            let inside = |c: i64| {
                let mut p = [3, 4, 5];
                p[axis] = c;
                roi.in_range(p[0], p[1], p[2])
            };
            assert!(!inside(lo - 1));
            assert!(inside(lo));
            assert!(inside(hi));
            assert!(!inside(hi + 1));
        }
    }

    #[test]
    fn test_get_size() {
        let roi = Roi::from_corners([5, 1, 0], [2, 3, 0]);
        assert_eq!(roi.get_size(0), 4);
        assert_eq!(roi.get_size(1), 3);
        assert_eq!(roi.get_size(2), 1);
        assert_eq!(roi.get_size(3), 0);
        assert_eq!(Roi::Unconstrained.get_size(0), 0);
    }

    #[test]
    fn test_rect_agrees_with_in_range() {
        let roi = Roi::Box {
            min: [1, 2, 3],
            max: [4, 5, 6],
        };
        for axis in 0..3 {
            let rect = roi.rect_2d(axis).unwrap();
            let (u, v) = plane_axes(axis);
            for a in -1..9 {
                for b in -1..9 {
                    // fix the projected axis inside the box
                    let mut p = [2, 3, 4];
                    p[u] = a;
                    p[v] = b;
                    assert_eq!(rect.contains(a, b), roi.in_range(p[0], p[1], p[2]));
                }
            }
        }
    }

    #[test]
    fn test_slabs_intersection() {
        let square = vec![(0.5, 0.5), (3.5, 0.5), (3.5, 3.5), (0.5, 3.5)];
        let roi = Roi::OrthogonalSlabs {
            polygons: [None, None, Some(square)],
        };
        assert!(roi.in_range(2, 2, 100));
        assert!(!roi.in_range(0, 2, 0));

        let xz = vec![(0.5, -0.5), (3.5, -0.5), (3.5, 1.5), (0.5, 1.5)];
        let both = Roi::OrthogonalSlabs {
            polygons: [
                None,
                Some(xz),
                Some(vec![(0.5, 0.5), (3.5, 0.5), (3.5, 3.5), (0.5, 3.5)]),
            ],
        };
        assert!(both.in_range(2, 2, 1));
        assert!(!both.in_range(2, 2, 2));
    }

    #[test]
    fn test_halfspace_planes() {
        let roi = Roi::HalfspacePlanes {
            planes: vec![
                Halfspace::new([2.0, 0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0, 0.0]),
                Halfspace::new([0.0, 0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0, 0.0]),
            ],
        };
        assert!(roi.in_range(2, 0, 0));
        assert!(!roi.in_range(1, 0, 0));
        assert!(roi.in_range_5d(&[3.0, 0.0, 0.0, 1.0, 0.0]));
        assert!(!roi.in_range_5d(&[3.0, 0.0, 0.0, 0.0, 0.0]));
        assert_eq!(roi.get_size(0), 0);
    }

    #[test]
    fn test_bounding_box_clips() {
        let roi = Roi::Box {
            min: [-3, 1, 2],
            max: [10, 2, 2],
        };
        assert_eq!(roi.bounding_box([4, 4, 4]), Some(([0, 1, 2], [3, 2, 2])));
        let outside = Roi::Box {
            min: [5, 0, 0],
            max: [6, 0, 0],
        };
        assert_eq!(outside.bounding_box([4, 4, 4]), None);
        assert_eq!(
            Roi::Unconstrained.bounding_box([2, 3, 4]),
            Some(([0, 0, 0], [1, 2, 3]))
        );
    }
}
