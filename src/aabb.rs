//! Axis-aligned bounding boxes used by the tiler and quantizer.
//!
//! Modeled on the teacher's `AxisAlignedBoundingBox3d<R>`, monomorphized to `f32`
//! since this crate has no second `Real` type to support (see `SPEC_FULL.md` §9).

use nalgebra::{Matrix4, Point3};

/// Epsilon used when checking AABB containment, to absorb float round-off from
/// the kd-tree's incremental splitting and growth.
const CONTAINMENT_EPSILON: f32 = 1e-4;

/// An axis-aligned bounding box in world or object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    min: Point3<f32>,
    max: Point3<f32>,
}

impl Aabb3 {
    /// Builds an AABB from explicit min/max corners. Does not validate `min <= max`;
    /// callers that need that invariant checked should go through [`Aabb3::from_points`].
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Builds an AABB from the `[xmin,ymin,zmin,xmax,ymax,zmax]` wire representation.
    pub fn from_array(a: [f32; 6]) -> Self {
        Self::new(Point3::new(a[0], a[1], a[2]), Point3::new(a[3], a[4], a[5]))
    }

    /// Returns the `[xmin,ymin,zmin,xmax,ymax,zmax]` wire representation.
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    /// Computes the smallest AABB enclosing the given points. Returns `None` if
    /// `points` is empty.
    pub fn from_points(points: &[Point3<f32>]) -> Option<Self> {
        let mut iter = points.iter();
        let first = *iter.next()?;
        let mut aabb = Self::new(first, first);
        for &p in iter {
            aabb.expand_to_include(p);
        }
        Some(aabb)
    }

    /// Expands this AABB to include the given point.
    pub fn expand_to_include(&mut self, p: Point3<f32>) {
        self.min = Point3::new(
            self.min.x.min(p.x),
            self.min.y.min(p.y),
            self.min.z.min(p.z),
        );
        self.max = Point3::new(
            self.max.x.max(p.x),
            self.max.y.max(p.y),
            self.max.z.max(p.z),
        );
    }

    /// Expands this AABB to include another AABB, in place.
    pub fn expand_to_include_aabb(&mut self, other: &Aabb3) {
        self.expand_to_include(other.min);
        self.expand_to_include(other.max);
    }

    /// Returns the union of two AABBs.
    pub fn union(a: &Aabb3, b: &Aabb3) -> Aabb3 {
        let mut u = *a;
        u.expand_to_include_aabb(b);
        u
    }

    /// Minimum corner.
    pub fn min(&self) -> Point3<f32> {
        self.min
    }

    /// Maximum corner.
    pub fn max(&self) -> Point3<f32> {
        self.max
    }

    /// Per-axis extent (`max - min`).
    pub fn extent(&self) -> nalgebra::Vector3<f32> {
        self.max - self.min
    }

    /// Returns the axis (0 = x, 1 = y, 2 = z) with the greatest extent. Ties are broken
    /// by the lower axis index, per `spec.md` §4.3.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        let (mut axis, mut best) = (0usize, e.x);
        if e.y > best {
            axis = 1;
            best = e.y;
        }
        if e.z > best {
            axis = 2;
        }
        axis
    }

    /// Splits this AABB in half along `axis`, returning `(low_half, high_half)`.
    pub fn split_half(&self, axis: usize) -> (Aabb3, Aabb3) {
        let mid = (self.min[axis] + self.max[axis]) * 0.5;
        let mut low_max = self.max;
        low_max[axis] = mid;
        let mut high_min = self.min;
        high_min[axis] = mid;
        (Aabb3::new(self.min, low_max), Aabb3::new(high_min, self.max))
    }

    /// Whether `other` is fully contained within `self`, within [`CONTAINMENT_EPSILON`].
    pub fn contains_aabb(&self, other: &Aabb3) -> bool {
        (0..3).all(|axis| {
            other.min[axis] >= self.min[axis] - CONTAINMENT_EPSILON
                && other.max[axis] <= self.max[axis] + CONTAINMENT_EPSILON
        })
    }

    /// Builds the 4x4 affine matrix that maps a raw 16-bit quantized coordinate
    /// (each component in `[0, 65535]`, as an integer cast to `f32`) quantized against
    /// this AABB back to world space.
    ///
    /// `scale = (max - min) / 65535`, `translation = min`, matching `spec.md` §4.1.
    pub fn decode_matrix(&self) -> Matrix4<f32> {
        let extent = self.extent();
        let scale = extent / crate::quantize::QUANT_MAX as f32;
        let mut m = Matrix4::identity();
        m[(0, 0)] = scale.x;
        m[(1, 1)] = scale.y;
        m[(2, 2)] = scale.z;
        m[(0, 3)] = self.min.x;
        m[(1, 3)] = self.min.y;
        m[(2, 3)] = self.min.z;
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_unit_cube() {
        let pts = [
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, 0.5),
        ];
        let aabb = Aabb3::from_points(&pts).unwrap();
        assert_eq!(aabb.min(), Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(aabb.max(), Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn longest_axis_ties_break_low() {
        let aabb = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(aabb.longest_axis(), 0);
    }

    #[test]
    fn split_half_produces_adjacent_halves() {
        let aabb = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 1.0, 1.0));
        let (lo, hi) = aabb.split_half(0);
        assert_eq!(lo.max().x, 5.0);
        assert_eq!(hi.min().x, 5.0);
        assert!(aabb.contains_aabb(&lo));
        assert!(aabb.contains_aabb(&hi));
    }

    #[test]
    fn decode_matrix_round_trips_corners() {
        let aabb = Aabb3::new(Point3::new(-2.0, 0.0, 10.0), Point3::new(4.0, 8.0, 12.0));
        let m = aabb.decode_matrix();
        let decoded_min = m.transform_point(&Point3::new(0.0, 0.0, 0.0));
        let decoded_max = m.transform_point(&Point3::new(65535.0, 65535.0, 65535.0));
        assert!((decoded_min - aabb.min()).norm() < 1e-4);
        assert!((decoded_max - aabb.max()).norm() < 1e-2);
    }
}
