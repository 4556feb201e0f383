//! Octahedral encoding/decoding of unit normals to a signed 8-bit pair.
//!
//! Standard octahedral projection with the lower-hemisphere fold, per `spec.md` §4.1.
//! Relative error stays below ~2 degrees; the poles (`±z`) round-trip stably.

use nalgebra::Vector3;

/// Maximum magnitude of an encoded component (signed 8-bit, but clamped to 127 so
/// `-128` is never produced and the encoding stays symmetric around zero).
const OCT_MAX: f32 = 127.0;

/// Encodes a unit-length normal into a signed 8-bit octahedral pair.
///
/// `n` is expected to already be unit length (normals are normalized by the caller
/// before being handed to this function); this function does not renormalize.
pub fn oct_encode(n: Vector3<f32>) -> [i8; 2] {
    let l1_norm = n.x.abs() + n.y.abs() + n.z.abs();
    let inv_l1 = if l1_norm > 0.0 { 1.0 / l1_norm } else { 0.0 };
    let mut u = n.x * inv_l1;
    let mut v = n.y * inv_l1;

    if n.z < 0.0 {
        let (folded_u, folded_v) = (
            (1.0 - v.abs()) * sign_no_zero(u),
            (1.0 - u.abs()) * sign_no_zero(v),
        );
        u = folded_u;
        v = folded_v;
    }

    [
        round_away_from_zero(u * OCT_MAX) as i8,
        round_away_from_zero(v * OCT_MAX) as i8,
    ]
}

/// Decodes a signed 8-bit octahedral pair back into a unit-length normal.
pub fn oct_decode(e: [i8; 2]) -> Vector3<f32> {
    let u = e[0] as f32 / OCT_MAX;
    let v = e[1] as f32 / OCT_MAX;

    let z = 1.0 - u.abs() - v.abs();
    let (x, y) = if z < 0.0 {
        (
            (1.0 - v.abs()) * sign_no_zero(u),
            (1.0 - u.abs()) * sign_no_zero(v),
        )
    } else {
        (u, v)
    };
    Vector3::new(x, y, z).normalize()
}

/// Sign function that treats zero as positive, avoiding the `-0.0` asymmetry called
/// out in `spec.md` §4.1 ("rounding ties away from zero").
fn sign_no_zero(x: f32) -> f32 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Rounds to the nearest integer, with ties (`x.fract() == 0.5`) rounded away from zero.
fn round_away_from_zero(x: f32) -> f32 {
    x.round()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angle_deg(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
        let cos = a.normalize().dot(&b.normalize()).clamp(-1.0, 1.0);
        cos.acos().to_degrees()
    }

    #[test]
    fn round_trip_axis_aligned_normals() {
        for n in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ] {
            let decoded = oct_decode(oct_encode(n));
            assert!((decoded.norm() - 1.0).abs() < 1e-3);
            assert!(angle_deg(n, decoded) <= 2.0);
        }
    }

    #[test]
    fn poles_round_trip_within_half_degree() {
        for n in [Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, -1.0)] {
            let decoded = oct_decode(oct_encode(n));
            assert!(angle_deg(n, decoded) <= 0.5);
        }
    }

    #[test]
    fn round_trip_arbitrary_normals_within_two_degrees() {
        let normals = [
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, -1.0, 0.3),
            Vector3::new(-0.2, 0.8, -0.5),
            Vector3::new(0.1, 0.1, -0.99),
        ];
        for n in normals {
            let n = n.normalize();
            let decoded = oct_decode(oct_encode(n));
            assert!((decoded.norm() - 1.0).abs() < 1e-2);
            assert!(angle_deg(n, decoded) <= 2.0);
        }
    }
}
