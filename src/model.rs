//! The in-memory model graph: [`Primitive`], [`PrimitiveInstance`], [`Entity`], and the
//! [`Model`] arena that owns them, per `spec.md` §3/§4.2.
//!
//! References between these types are plain dense `u32` indices into the owning
//! `Model`'s vectors (see `SPEC_FULL.md` §3 / `spec.md` §9 "Back-references") — there are
//! no back-pointers and no interior mutability.

use log::warn;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::aabb::Aabb3;
use crate::edges::{compute_edge_indices, DEFAULT_EDGE_THRESHOLD_DEGREES};
use crate::error::{ModelError, Warning};
use crate::oct::oct_encode;
use crate::tiler::Tile;
use crate::{new_map, MapType};

/// Below this length, a normal is treated as a near-zero vector that cannot be
/// renormalized (`spec.md` §7 `InvalidInput`: "non-unit normals that cannot be
/// renormalized").
const NORMAL_ZERO_EPSILON: f32 = 1e-6;
/// Normals within this distance of unit length are accepted as-is; anything further
/// off (but not near-zero) is renormalized rather than rejected.
const NORMAL_UNIT_EPSILON: f32 = 1e-4;

/// A geometry atom: positions, normals, and a triangulation, possibly shared by
/// multiple entities. See `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Primitive {
    /// Stable, externally supplied identifier.
    pub primitive_id: String,
    /// Dense index, equal to insertion order.
    pub primitive_index: u32,
    /// `[r, g, b]`, each `0..=255`.
    pub color: [u8; 3],
    /// `0.0..=1.0`.
    pub opacity: f32,
    /// Whether two or more entities reference this primitive.
    pub reused: bool,
    /// World space if `!reused`, object (local) space if `reused`.
    pub positions: Vec<Point3<f32>>,
    /// Same frame as `positions`, unit length.
    pub normals: Vec<Vector3<f32>>,
    /// Octahedral encoding of `normals`, one pair per vertex.
    pub normals_oct_encoded: Vec<[i8; 2]>,
    /// Flat triangle list, indexing into `positions`.
    pub indices: Vec<u32>,
    /// Flat line list, indexing into `positions`, derived from `indices` by the
    /// dihedral-angle threshold rule.
    pub edge_indices: Vec<u32>,
    /// 16-bit quantized positions, populated by the tiler. Empty until tiling runs.
    pub positions_quantized: Vec<[u16; 3]>,
}

impl Primitive {
    /// Number of vertices (`positions.len()`, which equals `normals.len()`).
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// A `(instance_index, primitive_ref, entity_ref)` triple: one use of one primitive by
/// one entity. See `spec.md` §3.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveInstance {
    /// Dense index, equal to global insertion order across all entities.
    pub instance_index: u32,
    /// Index into `Model::primitives`.
    pub primitive_ref: u32,
    /// Index into `Model::entities`.
    pub entity_ref: u32,
}

/// A named object aggregating one or more primitive instances. See `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Stable, externally supplied identifier.
    pub entity_id: String,
    /// Dense index, equal to insertion order.
    pub entity_index: u32,
    /// Modeling transform. Only meaningful when `has_reused_primitives` is true;
    /// otherwise it has already been baked into the primitives' world-space positions.
    pub matrix: Matrix4<f32>,
    /// Indices into `Model::instances`, in the order they were created.
    pub primitive_instances: Vec<u32>,
    /// World-space AABB enclosing every primitive used by this entity.
    pub aabb: Aabb3,
    /// All-or-nothing: every primitive of this entity is shared, or none are.
    pub has_reused_primitives: bool,
}

/// The root of the in-memory model graph. Owns insertion-ordered arenas of
/// primitives, instances, entities, and (after [`Model::create_tiles`]) tiles.
#[derive(Debug)]
pub struct Model {
    primitives: Vec<Primitive>,
    instances: Vec<PrimitiveInstance>,
    entities: Vec<Entity>,
    tiles: Vec<Tile>,
    primitive_index: MapType<String, u32>,
    entity_index: MapType<String, u32>,
    /// Union AABB of the object-space positions of every reused primitive; `None`
    /// until `create_tiles` runs, or if there are no reused primitives.
    instanced_primitives_aabb: Option<Aabb3>,
    warnings: Vec<Warning>,
    /// Dihedral-angle threshold (degrees) used by `create_primitive`'s edge extraction.
    edge_threshold_degrees: f32,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self {
            primitives: Vec::new(),
            instances: Vec::new(),
            entities: Vec::new(),
            tiles: Vec::new(),
            primitive_index: new_map(),
            entity_index: new_map(),
            instanced_primitives_aabb: None,
            warnings: Vec::new(),
            edge_threshold_degrees: DEFAULT_EDGE_THRESHOLD_DEGREES,
        }
    }

    /// Overrides the dihedral-angle threshold used by subsequent `create_primitive`
    /// calls to decide which shared edges to keep (default 10 degrees).
    pub fn set_edge_threshold_degrees(&mut self, degrees: f32) {
        self.edge_threshold_degrees = degrees;
    }

    /// All primitives, in insertion order.
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// All primitive instances, in global insertion order (the wire order of
    /// `primitive_instances` in `spec.md` §4.4).
    pub fn instances(&self) -> &[PrimitiveInstance] {
        &self.instances
    }

    /// All entities, in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// All tiles, in flattening order. Empty until [`Model::create_tiles`] runs.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut Vec<Tile> {
        &mut self.tiles
    }

    pub(crate) fn primitives_mut(&mut self) -> &mut Vec<Primitive> {
        &mut self.primitives
    }

    /// Non-fatal warnings accumulated during building (currently only
    /// [`Warning::UnknownPrimitive`]).
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The union AABB of every reused primitive's object-space positions, if any
    /// reused primitives exist and tiling has run.
    pub fn instanced_primitives_aabb(&self) -> Option<&Aabb3> {
        self.instanced_primitives_aabb.as_ref()
    }

    pub(crate) fn set_instanced_primitives_aabb(&mut self, aabb: Option<Aabb3>) {
        self.instanced_primitives_aabb = aabb;
    }

    /// Looks up a primitive's dense index by its stable id.
    pub fn primitive_index_of(&self, id: &str) -> Option<u32> {
        self.primitive_index.get(id).copied()
    }

    /// Looks up an entity's dense index by its stable id.
    pub fn entity_index_of(&self, id: &str) -> Option<u32> {
        self.entity_index.get(id).copied()
    }

    /// Creates a primitive. See `spec.md` §4.2.
    ///
    /// If `reused` is `false`, `positions` is transformed in place by `modeling_matrix`
    /// (world space) and `normals` by its inverse-transpose. If `reused` is `true`,
    /// both stay in object (local) space and the normal transform is skipped (`spec.md`
    /// §9 Q2: harmless but superfluous when the matrix would be identity relative to the
    /// primitive's own frame).
    #[allow(clippy::too_many_arguments)]
    pub fn create_primitive(
        &mut self,
        id: impl Into<String>,
        reused: bool,
        modeling_matrix: Matrix4<f32>,
        color: [u8; 3],
        opacity: f32,
        mut positions: Vec<Point3<f32>>,
        mut normals: Vec<Vector3<f32>>,
        indices: Vec<u32>,
    ) -> Result<u32, ModelError> {
        let id = id.into();
        if self.primitive_index.contains_key(&id) {
            return Err(ModelError::DuplicatePrimitive(id));
        }

        if positions.is_empty() || indices.is_empty() {
            return Err(ModelError::InvalidInput(format!(
                "primitive \"{id}\" has no positions or no indices"
            )));
        }
        if positions.len() != normals.len() {
            return Err(ModelError::InvalidInput(format!(
                "primitive \"{id}\": positions.len() ({}) != normals.len() ({})",
                positions.len(),
                normals.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(ModelError::InvalidInput(format!(
                "primitive \"{id}\": indices.len() ({}) is not a multiple of 3",
                indices.len()
            )));
        }
        let num_vertices = positions.len() as u32;
        if let Some(&bad) = indices.iter().find(|&&i| i >= num_vertices) {
            return Err(ModelError::InvalidInput(format!(
                "primitive \"{id}\": index {bad} out of range for {num_vertices} vertices"
            )));
        }
        if positions.iter().any(|p| !p.coords.iter().all(|c| c.is_finite()))
            || normals.iter().any(|n| !n.iter().all(|c| c.is_finite()))
        {
            return Err(ModelError::InvalidInput(format!(
                "primitive \"{id}\" contains non-finite position or normal"
            )));
        }
        for n in normals.iter_mut() {
            let len = n.norm();
            if len <= NORMAL_ZERO_EPSILON {
                return Err(ModelError::InvalidInput(format!(
                    "primitive \"{id}\": normal has near-zero length ({len}) and cannot be renormalized"
                )));
            }
            if (len - 1.0).abs() > NORMAL_UNIT_EPSILON {
                *n /= len;
            }
        }

        let edge_indices =
            compute_edge_indices(&positions, &indices, self.edge_threshold_degrees);

        if !reused {
            for p in positions.iter_mut() {
                *p = modeling_matrix.transform_point(p);
            }

            let linear = modeling_matrix.fixed_slice::<3, 3>(0, 0).into_owned();
            let normal_matrix: Matrix3<f32> = linear
                .try_inverse()
                .ok_or_else(|| {
                    ModelError::InvalidInput(format!(
                        "primitive \"{id}\": modeling matrix is not invertible, cannot derive normal matrix"
                    ))
                })?
                .transpose();
            for n in normals.iter_mut() {
                let transformed = normal_matrix * *n;
                *n = if transformed.norm_squared() > 0.0 {
                    transformed.normalize()
                } else {
                    transformed
                };
            }
        }

        let normals_oct_encoded = normals.iter().map(|&n| oct_encode(n)).collect();

        let primitive_index = self.primitives.len() as u32;
        self.primitives.push(Primitive {
            primitive_id: id.clone(),
            primitive_index,
            color,
            opacity,
            reused,
            positions,
            normals,
            normals_oct_encoded,
            indices,
            edge_indices,
            positions_quantized: Vec::new(),
        });
        self.primitive_index.insert(id, primitive_index);

        Ok(primitive_index)
    }

    /// Creates an entity. See `spec.md` §4.2.
    ///
    /// Builds one [`PrimitiveInstance`] per valid `primitive_id`; unknown ids are
    /// dropped with a [`Warning::UnknownPrimitive`] rather than failing the call.
    pub fn create_entity<S: AsRef<str>>(
        &mut self,
        id: impl Into<String>,
        modeling_matrix: Matrix4<f32>,
        primitive_ids: &[S],
        has_reused_primitives: bool,
    ) -> Result<u32, ModelError> {
        let id = id.into();
        if self.entity_index.contains_key(&id) {
            return Err(ModelError::DuplicateEntity(id));
        }

        let entity_index = self.entities.len() as u32;
        let mut instance_refs = Vec::with_capacity(primitive_ids.len());
        let mut aabb: Option<Aabb3> = None;

        for primitive_id in primitive_ids {
            let primitive_id = primitive_id.as_ref();
            let Some(primitive_ref) = self.primitive_index_of(primitive_id) else {
                let warning = Warning::UnknownPrimitive {
                    entity_id: id.clone(),
                    primitive_id: primitive_id.to_string(),
                };
                warn!("{warning}");
                self.warnings.push(warning);
                continue;
            };

            let instance_index = self.instances.len() as u32;
            self.instances.push(PrimitiveInstance {
                instance_index,
                primitive_ref,
                entity_ref: entity_index,
            });
            instance_refs.push(instance_index);

            let primitive = &self.primitives[primitive_ref as usize];
            for &p in &primitive.positions {
                let world_p = if has_reused_primitives {
                    modeling_matrix.transform_point(&p)
                } else {
                    p
                };
                match &mut aabb {
                    Some(a) => a.expand_to_include(world_p),
                    None => aabb = Some(Aabb3::new(world_p, world_p)),
                }
            }
        }

        self.entities.push(Entity {
            entity_id: id.clone(),
            entity_index,
            matrix: modeling_matrix,
            primitive_instances: instance_refs,
            aabb: aabb.unwrap_or_else(|| Aabb3::new(Point3::origin(), Point3::origin())),
            has_reused_primitives,
        });
        self.entity_index.insert(id, entity_index);

        Ok(entity_index)
    }
}
