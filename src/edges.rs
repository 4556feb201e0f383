//! Edge-index extraction from a triangle mesh by dihedral-angle threshold.
//!
//! Per `spec.md` §4.1: emit the shared edge of two adjacent triangles iff the angle
//! between their face normals exceeds `theta` (default 10 degrees); boundary edges
//! (shared by exactly one triangle) are always emitted. Output is deterministic:
//! triangle-scan order, smaller vertex index first per edge.

use nalgebra::Point3;

use crate::new_map;

/// Default dihedral-angle threshold, in degrees, above which a shared edge is kept.
pub const DEFAULT_EDGE_THRESHOLD_DEGREES: f32 = 10.0;

/// Computes the edge-index list (a flat list of vertex-index pairs) for a triangle
/// mesh given as `positions` (flat triples) and `indices` (flat triples, one per
/// triangle corner).
pub fn compute_edge_indices(
    positions: &[Point3<f32>],
    indices: &[u32],
    threshold_degrees: f32,
) -> Vec<u32> {
    debug_assert_eq!(indices.len() % 3, 0);

    let triangle_normal = |tri: [u32; 3]| -> nalgebra::Vector3<f32> {
        let a = positions[tri[0] as usize];
        let b = positions[tri[1] as usize];
        let c = positions[tri[2] as usize];
        (b - a).cross(&(c - a)).normalize()
    };

    // Map from an undirected edge (smaller index first) to the list of triangle
    // indices that contain it, in the order the triangles were scanned.
    let mut edge_triangles: crate::MapType<(u32, u32), smallvec::SmallVec<[u32; 2]>> = new_map();
    // Preserve first-seen order of edges for deterministic output.
    let mut edge_order: Vec<(u32, u32)> = Vec::new();

    let num_triangles = indices.len() / 3;
    for tri_idx in 0..num_triangles {
        let tri = [
            indices[tri_idx * 3],
            indices[tri_idx * 3 + 1],
            indices[tri_idx * 3 + 2],
        ];
        for e in 0..3 {
            let (v0, v1) = (tri[e], tri[(e + 1) % 3]);
            let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            let entry = edge_triangles.entry(key).or_insert_with(|| {
                edge_order.push(key);
                smallvec::SmallVec::new()
            });
            entry.push(tri_idx as u32);
        }
    }

    let threshold_cos = threshold_degrees.to_radians().cos();

    let mut edge_indices = Vec::new();
    for key in edge_order {
        let tris = &edge_triangles[&key];
        let keep = match tris.len() {
            1 => true,
            _ => {
                let tri_a = [
                    indices[tris[0] as usize * 3],
                    indices[tris[0] as usize * 3 + 1],
                    indices[tris[0] as usize * 3 + 2],
                ];
                let tri_b = [
                    indices[tris[1] as usize * 3],
                    indices[tris[1] as usize * 3 + 1],
                    indices[tris[1] as usize * 3 + 2],
                ];
                let cos_angle = triangle_normal(tri_a).dot(&triangle_normal(tri_b));
                cos_angle < threshold_cos
            }
        };
        if keep {
            edge_indices.push(key.0);
            edge_indices.push(key.1);
        }
    }

    edge_indices
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit cube, 12 triangles, 90 degree dihedral at every box edge: all 12 edges
    /// must survive the default 10 degree threshold (scenario 1 of `spec.md` §8).
    #[test]
    fn cube_emits_twelve_edges() {
        let p = [
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0, 1, 2, 0, 2, 3, // -z
            4, 6, 5, 4, 7, 6, // +z
            0, 4, 5, 0, 5, 1, // -y
            3, 2, 6, 3, 6, 7, // +y
            0, 3, 7, 0, 7, 4, // -x
            1, 5, 6, 1, 6, 2, // +x
        ];
        let edges = compute_edge_indices(&p, &indices, DEFAULT_EDGE_THRESHOLD_DEGREES);
        assert_eq!(edges.len() / 2, 12);
    }

    /// Two coplanar triangles forming a quad: 4 boundary edges, 0 shared (dihedral
    /// 0 degrees is below the threshold) — scenario 4 of `spec.md` §8.
    #[test]
    fn coplanar_quad_emits_only_boundary_edges() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let indices: Vec<u32> = vec![0, 1, 2, 0, 2, 3];
        let edges = compute_edge_indices(&p, &indices, DEFAULT_EDGE_THRESHOLD_DEGREES);
        assert_eq!(edges.len() / 2, 4);
        // The shared diagonal (0, 2) must not be present.
        assert!(!edges.chunks(2).any(|e| (e[0], e[1]) == (0, 2)));
    }

    #[test]
    fn emits_smaller_index_first() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let indices: Vec<u32> = vec![2, 0, 1];
        let edges = compute_edge_indices(&p, &indices, DEFAULT_EDGE_THRESHOLD_DEGREES);
        for pair in edges.chunks(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
