//! The spatial partitioner: a kd-tree over entity AABBs, flattened into [`Tile`]
//! records. See `spec.md` §4.3.
//!
//! `spec.md` §9 Open Question Q1 notes a defect in the original source (a hard-coded
//! `[-1000, 1000]^3` tile AABB that disables proper per-tile quantization). This
//! implementation always uses the true, grown tile AABB.

use log::info;
use nalgebra::Matrix4;

use crate::aabb::Aabb3;
use crate::error::TilerError;
use crate::model::Model;
use crate::quantize::quantize_position_checked;

/// Maximum kd-tree depth. Entities that cannot be placed in a child by this depth
/// are held locally at the deepest node they reach.
pub const DEFAULT_KD_TREE_MAX_DEPTH: u32 = 5;

/// Configuration for [`Model::create_tiles`].
#[derive(Debug, Clone, Copy)]
pub struct TilerParameters {
    /// Maximum kd-tree depth (`D` in `spec.md` §4.3).
    pub kd_tree_max_depth: u32,
}

impl Default for TilerParameters {
    fn default() -> Self {
        Self {
            kd_tree_max_depth: DEFAULT_KD_TREE_MAX_DEPTH,
        }
    }
}

/// A spatial bucket of entities sharing one positions decode matrix. See `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Tile {
    /// World-space AABB of every entity placed in this tile.
    pub aabb: Aabb3,
    /// 4x4 matrix mapping this tile's 16-bit quantized coordinates back to world space.
    pub positions_decode_matrix: Matrix4<f32>,
    /// Indices into `Model::entities`, in model-insertion order within the tile.
    pub entities: Vec<u32>,
}

struct KdNode {
    aabb: Aabb3,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
    entities: Vec<u32>,
}

impl KdNode {
    fn new(aabb: Aabb3) -> Self {
        Self {
            aabb,
            left: None,
            right: None,
            entities: Vec::new(),
        }
    }

    /// Places `entity_index` (with world-space AABB `entity_aabb`) per the rule in
    /// `spec.md` §4.3.
    fn insert(&mut self, depth: u32, max_depth: u32, entity_index: u32, entity_aabb: &Aabb3) {
        if depth >= max_depth {
            self.entities.push(entity_index);
            self.aabb.expand_to_include_aabb(entity_aabb);
            return;
        }

        if let Some(left) = &mut self.left {
            if left.aabb.contains_aabb(entity_aabb) {
                left.insert(depth + 1, max_depth, entity_index, entity_aabb);
                return;
            }
        }
        if let Some(right) = &mut self.right {
            if right.aabb.contains_aabb(entity_aabb) {
                right.insert(depth + 1, max_depth, entity_index, entity_aabb);
                return;
            }
        }

        let axis = self.aabb.longest_axis();
        let (low, high) = self.aabb.split_half(axis);

        if self.left.is_none() && low.contains_aabb(entity_aabb) {
            let mut child = Box::new(KdNode::new(low));
            child.insert(depth + 1, max_depth, entity_index, entity_aabb);
            self.left = Some(child);
            return;
        }
        if self.right.is_none() && high.contains_aabb(entity_aabb) {
            let mut child = Box::new(KdNode::new(high));
            child.insert(depth + 1, max_depth, entity_index, entity_aabb);
            self.right = Some(child);
            return;
        }

        self.entities.push(entity_index);
        self.aabb.expand_to_include_aabb(entity_aabb);
    }

    /// Pre-order flatten: a node becomes a [`Tile`] iff it holds entities locally;
    /// its children are still visited regardless.
    fn flatten_into(&self, out: &mut Vec<Tile>) {
        if !self.entities.is_empty() {
            out.push(Tile {
                aabb: self.aabb,
                positions_decode_matrix: self.aabb.decode_matrix(),
                entities: self.entities.clone(),
            });
        }
        if let Some(left) = &self.left {
            left.flatten_into(out);
        }
        if let Some(right) = &self.right {
            right.flatten_into(out);
        }
    }
}

impl Model {
    /// Builds the kd-tree over every entity's AABB, flattens it into tiles, and
    /// quantizes every primitive's positions against the appropriate AABB (its
    /// owning tile for non-reused primitives, the global reused-primitives AABB for
    /// reused ones). See `spec.md` §4.3.
    ///
    /// Must be called exactly once, after all entities have been created.
    pub fn create_tiles(&mut self, params: &TilerParameters) -> Result<(), TilerError> {
        let root_aabb = self
            .entities()
            .iter()
            .map(|e| e.aabb)
            .reduce(|a, b| Aabb3::union(&a, &b))
            .unwrap_or_else(|| Aabb3::new(nalgebra::Point3::origin(), nalgebra::Point3::origin()));

        let mut root = KdNode::new(root_aabb);
        for entity in self.entities() {
            root.insert(0, params.kd_tree_max_depth, entity.entity_index, &entity.aabb);
        }

        let mut tiles = Vec::new();
        root.flatten_into(&mut tiles);

        info!(
            "tiler: partitioned {} entities into {} tiles (max depth {})",
            self.entities().len(),
            tiles.len(),
            params.kd_tree_max_depth
        );

        // Global AABB for reused (instanced) primitives: the union of their
        // object-space positions, independent of tiling.
        let mut instanced_aabb: Option<Aabb3> = None;
        for primitive in self.primitives() {
            if primitive.reused {
                if let Some(prim_aabb) = Aabb3::from_points(&primitive.positions) {
                    instanced_aabb = Some(match instanced_aabb {
                        Some(existing) => Aabb3::union(&existing, &prim_aabb),
                        None => prim_aabb,
                    });
                }
            }
        }

        // Quantize non-reused primitives against their owning tile's AABB.
        for tile in &tiles {
            for &entity_index in &tile.entities {
                let instance_refs = self.entities()[entity_index as usize]
                    .primitive_instances
                    .clone();
                for instance_ref in instance_refs {
                    let primitive_ref = self.instances()[instance_ref as usize].primitive_ref;
                    let reused = self.primitives()[primitive_ref as usize].reused;
                    if reused {
                        continue;
                    }
                    let positions = self.primitives()[primitive_ref as usize].positions.clone();
                    let mut quantized = Vec::with_capacity(positions.len());
                    for p in positions {
                        quantized.push(quantize_position_checked(p, &tile.aabb)?);
                    }
                    self.primitives_mut()[primitive_ref as usize].positions_quantized = quantized;
                }
            }
        }

        // Quantize reused primitives against the global instanced-primitives AABB.
        if let Some(instanced_aabb) = instanced_aabb {
            for primitive in self.primitives_mut() {
                if !primitive.reused {
                    continue;
                }
                let mut quantized = Vec::with_capacity(primitive.positions.len());
                for p in primitive.positions.clone() {
                    quantized.push(quantize_position_checked(p, &instanced_aabb)?);
                }
                primitive.positions_quantized = quantized;
            }
        }
        self.set_instanced_primitives_aabb(instanced_aabb);

        *self.tiles_mut() = tiles;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn make_cube_primitive(model: &mut Model, id: &str, matrix: Matrix4<f32>) {
        let p = vec![
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        let n: Vec<Vector3<f32>> = (0..8).map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0, 1, 2, 0, 2, 3,
            4, 6, 5, 4, 7, 6,
            0, 4, 5, 0, 5, 1,
            3, 2, 6, 3, 6, 7,
            0, 3, 7, 0, 7, 4,
            1, 5, 6, 1, 6, 2,
        ];
        model
            .create_primitive(id, false, matrix, [10, 20, 30], 1.0, p, n, indices)
            .unwrap();
    }

    /// Scenario 3 of `spec.md` §8: two far-apart entities force at least two tiles.
    #[test]
    fn disjoint_entities_force_multiple_tiles() {
        let mut model = Model::new();
        make_cube_primitive(&mut model, "p", Matrix4::new_translation(&Vector3::new(0.0, 0.0, 0.0)));
        make_cube_primitive(
            &mut model,
            "q",
            Matrix4::new_translation(&Vector3::new(1000.0, 0.0, 0.0)),
        );
        model.create_entity("P", Matrix4::identity(), &["p"], false).unwrap();
        model.create_entity("Q", Matrix4::identity(), &["q"], false).unwrap();

        model.create_tiles(&TilerParameters::default()).unwrap();

        assert!(model.tiles().len() >= 2);
        let tile_of = |entity_idx: u32| {
            model
                .tiles()
                .iter()
                .position(|t| t.entities.contains(&entity_idx))
                .unwrap()
        };
        assert_ne!(tile_of(0), tile_of(1));
    }

    #[test]
    fn every_entity_contained_in_its_tile_aabb() {
        let mut model = Model::new();
        make_cube_primitive(&mut model, "p", Matrix4::identity());
        make_cube_primitive(
            &mut model,
            "q",
            Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)),
        );
        model.create_entity("P", Matrix4::identity(), &["p"], false).unwrap();
        model.create_entity("Q", Matrix4::identity(), &["q"], false).unwrap();
        model.create_tiles(&TilerParameters::default()).unwrap();

        for tile in model.tiles() {
            for &entity_idx in &tile.entities {
                let entity_aabb = model.entities()[entity_idx as usize].aabb;
                assert!(tile.aabb.contains_aabb(&entity_aabb));
            }
        }
    }

    #[test]
    fn single_cube_yields_tile_matching_cube_aabb() {
        let mut model = Model::new();
        make_cube_primitive(&mut model, "cube", Matrix4::identity());
        model
            .create_entity("e", Matrix4::identity(), &["cube"], false)
            .unwrap();
        model.create_tiles(&TilerParameters::default()).unwrap();

        assert_eq!(model.tiles().len(), 1);
        let a = model.tiles()[0].aabb.to_array();
        for (got, want) in a.iter().zip([-0.5, -0.5, -0.5, 0.5, 0.5, 0.5].iter()) {
            assert!((got - want).abs() < 1e-4);
        }
    }
}
