//! Position quantization relative to an axis-aligned bounding box.
//!
//! Per `spec.md` §4.1: `q = round((p - min) / (max - min) * 65535)`, clamped to
//! `[0, 65535]`. The companion decode matrix lives on [`crate::aabb::Aabb3`] so the
//! encoder always derives it from the exact AABB it quantized against.

use nalgebra::Point3;

use crate::aabb::Aabb3;
use crate::error::TilerError;

/// The maximum value of a quantized 16-bit component.
pub const QUANT_MAX: u16 = 65535;

/// Quantizes a single position against `aabb`, clamping to `[0, 65535]` per axis.
pub fn quantize_position(p: Point3<f32>, aabb: &Aabb3) -> [u16; 3] {
    let extent = aabb.extent();
    let min = aabb.min();
    let mut out = [0u16; 3];
    for axis in 0..3 {
        let e = extent[axis];
        let normalized = if e > 0.0 {
            (p[axis] - min[axis]) / e
        } else {
            0.0
        };
        let q = (normalized * QUANT_MAX as f32).round();
        out[axis] = q.clamp(0.0, QUANT_MAX as f32) as u16;
    }
    out
}

/// Quantizes a slice of positions against `aabb`.
pub fn quantize_positions(positions: &[Point3<f32>], aabb: &Aabb3) -> Vec<[u16; 3]> {
    positions.iter().map(|&p| quantize_position(p, aabb)).collect()
}

/// Dequantizes a single quantized position back to world space using `aabb`'s decode
/// matrix, reproducing the original within `(max - min) / 65535` per axis.
pub fn dequantize_position(q: [u16; 3], aabb: &Aabb3) -> Point3<f32> {
    let m = aabb.decode_matrix();
    m.transform_point(&Point3::new(q[0] as f32, q[1] as f32, q[2] as f32))
}

/// Quantizes a position but returns [`TilerError::QuantizationOverflow`] if the
/// position lies outside `aabb` by more than one quantization step on any axis. Used
/// by the tiler to surface a bug (a mis-assigned AABB) rather than silently clamping.
pub fn quantize_position_checked(
    p: Point3<f32>,
    aabb: &Aabb3,
) -> Result<[u16; 3], TilerError> {
    let extent = aabb.extent();
    let min = aabb.min();
    let max = aabb.max();
    for axis in 0..3 {
        let step = if extent[axis] > 0.0 {
            extent[axis] / QUANT_MAX as f32
        } else {
            0.0
        };
        if p[axis] < min[axis] - step || p[axis] > max[axis] + step {
            return Err(TilerError::QuantizationOverflow {
                position: [p.x, p.y, p.z],
                aabb: aabb.to_array(),
            });
        }
    }
    Ok(quantize_position(p, aabb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_one_lsb() {
        let aabb = Aabb3::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
        let p = Point3::new(0.1234, -0.4999, 0.5);
        let q = quantize_position(p, &aabb);
        let back = dequantize_position(q, &aabb);
        let max_err = aabb.extent().map(|e| e / QUANT_MAX as f32);
        assert!((back.x - p.x).abs() <= max_err.x + 1e-6);
        assert!((back.y - p.y).abs() <= max_err.y + 1e-6);
        assert!((back.z - p.z).abs() <= max_err.z + 1e-6);
    }

    #[test]
    fn clamps_out_of_range_positions() {
        let aabb = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let q = quantize_position(Point3::new(-5.0, 5.0, 0.5), &aabb);
        assert_eq!(q[0], 0);
        assert_eq!(q[1], QUANT_MAX);
    }

    #[test]
    fn checked_rejects_far_out_of_bounds() {
        let aabb = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(quantize_position_checked(Point3::new(0.5, 0.5, 0.5), &aabb).is_ok());
        assert!(quantize_position_checked(Point3::new(100.0, 0.5, 0.5), &aabb).is_err());
    }
}
